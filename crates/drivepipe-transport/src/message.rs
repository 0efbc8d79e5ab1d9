use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// String-keyed JSON object used for `params` and `result`.
pub type Map = serde_json::Map<String, Value>;

/// One protocol message: a request, a successful response, or an error
/// response.
///
/// On the wire all three share one JSON object shape; which fields are
/// present decides the variant. Requests without a meaningful `id` are
/// notifications (events) and carry `id: 0`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Error(ErrorResponse),
}

/// A method call (or event) addressed to an object by `guid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: i64,
    pub guid: String,
    pub method: String,
    pub params: Option<Map>,
}

/// A successful reply correlated to a request by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: i64,
    pub guid: String,
    /// Drivers omit `result` for calls that return nothing.
    pub result: Option<Map>,
}

/// A failed reply correlated to a request by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub id: i64,
    pub guid: String,
    pub error: ErrorDetails,
}

/// Driver-side error description, nested as `{"error": {"error": {..}}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Any further fields the driver sent, kept verbatim.
    #[serde(flatten)]
    pub extra: Map,
}

impl Request {
    /// Request without params. Use `id: 0` for a notification.
    pub fn new(id: i64, guid: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id,
            guid: guid.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Attach `params`, replacing any already set.
    pub fn with_params(mut self, params: Map) -> Self {
        self.params = Some(params);
        self
    }
}

impl ErrorDetails {
    /// Details carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl Message {
    /// Correlation id; `0` for notifications.
    pub fn id(&self) -> i64 {
        match self {
            Message::Request(m) => m.id,
            Message::Response(m) => m.id,
            Message::Error(m) => m.id,
        }
    }

    /// Target object on the driver side.
    pub fn guid(&self) -> &str {
        match self {
            Message::Request(m) => &m.guid,
            Message::Response(m) => &m.guid,
            Message::Error(m) => &m.guid,
        }
    }

    /// Method name, for requests only.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(m) => Some(&m.method),
            _ => None,
        }
    }

    /// `"request"`, `"response"` or `"error"`, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Error(_) => "error",
        }
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Message::Response(value)
    }
}

impl From<ErrorResponse> for Message {
    fn from(value: ErrorResponse) -> Self {
        Message::Error(value)
    }
}

/// Every field optional, as it may arrive from the driver.
#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    guid: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Map>,
    #[serde(default)]
    result: Option<Map>,
    #[serde(default)]
    error: Option<ErrorEnvelope<ErrorDetails>>,
}

#[derive(Serialize, Deserialize)]
struct ErrorEnvelope<T> {
    error: T,
}

impl WireMessage {
    fn classify(self) -> Result<Message, &'static str> {
        let id = self.id.unwrap_or_default();
        let guid = self.guid.unwrap_or_default();

        // `params` on a reply is not meaningful and is dropped.
        match (self.method, self.result, self.error) {
            (Some(method), None, None) => Ok(Message::Request(Request {
                id,
                guid,
                method,
                params: self.params,
            })),
            (None, result, None) => Ok(Message::Response(Response { id, guid, result })),
            (None, None, Some(envelope)) => Ok(Message::Error(ErrorResponse {
                id,
                guid,
                error: envelope.error,
            })),
            (Some(_), _, _) => Err("method together with result or error"),
            (None, Some(_), Some(_)) => Err("both result and error"),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireMessage::deserialize(deserializer)?
            .classify()
            .map_err(|shape| serde::de::Error::custom(format!("invalid message shape: {shape}")))
    }
}

/// Borrowed wire view used for serialization.
#[derive(Serialize)]
struct WireMessageRef<'a> {
    id: i64,
    guid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Map>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Map>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope<&'a ErrorDetails>>,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Message::Request(m) => WireMessageRef {
                id: m.id,
                guid: &m.guid,
                method: Some(&m.method),
                params: m.params.as_ref(),
                result: None,
                error: None,
            },
            Message::Response(m) => WireMessageRef {
                id: m.id,
                guid: &m.guid,
                method: None,
                params: None,
                result: m.result.as_ref(),
                error: None,
            },
            Message::Error(m) => WireMessageRef {
                id: m.id,
                guid: &m.guid,
                method: None,
                params: None,
                result: None,
                error: Some(ErrorEnvelope { error: &m.error }),
            },
        };
        wire.serialize(serializer)
    }
}
