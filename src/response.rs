use serde::{Deserialize, Serialize};

/// The result a handler returns to the Lambda runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn new(status_code: u16, message: impl Into<String>, data: Option<T>) -> Self {
        Response {
            status_code,
            message: message.into(),
            data,
        }
    }
}
