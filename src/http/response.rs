//! Synchronous acknowledgement written back to the caller.
//!
//! The response is framed by hand: status line, `Content-Length`,
//! `Content-Type`, blank line, JSON body. The caller's connection is closed
//! right after, so no keep-alive headers are sent.

use serde::Serialize;

/// Protocol token used when the inbound request never parsed.
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.1";

#[derive(Debug, Serialize)]
struct AckBody<'a> {
    code: u16,
    message: &'a str,
    data: Option<AckData<'a>>,
}

#[derive(Debug, Serialize)]
struct AckData<'a> {
    id: &'a str,
}

/// Outcome reported to the caller of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// The request is queued under this tracking id.
    Accepted { id: String },
    /// Nothing was queued.
    Rejected { message: String },
}

impl Ack {
    fn status_line(&self) -> &'static str {
        match self {
            Ack::Accepted { .. } => "200 OK",
            Ack::Rejected { .. } => "500 Internal Server Error",
        }
    }

    fn body(&self) -> Result<String, serde_json::Error> {
        let body = match self {
            Ack::Accepted { id } => AckBody {
                code: 200,
                message: "OK",
                data: Some(AckData { id }),
            },
            Ack::Rejected { message } => AckBody {
                code: 500,
                message,
                data: None,
            },
        };
        serde_json::to_string(&body)
    }

    /// Render the full HTTP response, mirroring `protocol` in the status line.
    pub fn render(&self, protocol: Option<&str>) -> Result<Vec<u8>, serde_json::Error> {
        let body = self.body()?;
        let response = format!(
            "{} {}\r\nContent-Length: {}\r\nContent-Type: application/json; charset=utf-8\r\n\r\n{}",
            protocol.unwrap_or(DEFAULT_PROTOCOL),
            self.status_line(),
            body.len(),
            body
        );
        Ok(response.into_bytes())
    }
}
