//! Network request tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolContext, ToolError};

/// Fetch a URL and return status plus body text.
pub struct HttpRequest {
    client: reqwest::Client,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Tool for HttpRequest {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Make an HTTP request. Supports GET and POST with an optional JSON \
         body. Returns the status code and response body."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to request."
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST"],
                    "description": "HTTP method, defaults to GET."
                },
                "body": {
                    "description": "Optional JSON body for POST requests."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgs("missing 'url' argument".into()))?;
        let method = args["method"].as_str().unwrap_or("GET");

        let request = match method {
            "GET" => self.client.get(url),
            "POST" => {
                let mut request = self.client.post(url);
                if !args["body"].is_null() {
                    request = request.json(&args["body"]);
                }
                request
            }
            other => {
                return Err(ToolError::InvalidArgs(format!(
                    "unsupported method: {other}"
                )))
            }
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(format!("status: {status}\n{body}"))
    }
}
