use crate::context::{
    AnswerRequest, AnswerResponse, ClassifyRequest, ClassifyResponse, ServiceError, ServiceStatus,
};
use serde::{Deserialize, Serialize};

/// Request from client to server, one JSON object per line.
///
/// ```json
/// {"type": "classify", "text": "Stocks rallied on Friday"}
/// {"type": "answer", "question": "What is the capital of France?"}
/// {"type": "status"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Classify(ClassifyRequest),
    Answer(AnswerRequest),
    Status,
}

/// Error payload of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Response sent back to the client, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Classification(ClassifyResponse),
    Answer(AnswerResponse),
    Status(ServiceStatus),
    Error(ErrorBody),
}

impl Response {
    pub fn error(error: &ServiceError) -> Self {
        Response::Error(ErrorBody {
            kind: error.kind().to_string(),
            message: error.to_string(),
        })
    }
}

impl From<ServiceError> for Response {
    fn from(error: ServiceError) -> Self {
        Response::error(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: Request =
            serde_json::from_str(r#"{"type":"answer","question":"Why?"}"#).unwrap();
        assert_eq!(
            request,
            Request::Answer(AnswerRequest {
                question: "Why?".to_string()
            })
        );

        let request: Request = serde_json::from_str(r#"{"type":"status"}"#).unwrap();
        assert_eq!(request, Request::Status);

        assert!(serde_json::from_str::<Request>(r#"{"type":"classify"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"type":"train"}"#).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_value(Response::Classification(ClassifyResponse {
            predicted_class: "Business".to_string(),
            confidence: 0.5,
        }))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "classification",
                "predicted_class": "Business",
                "confidence": 0.5
            })
        );

        let json = serde_json::to_value(Response::from(ServiceError::RetrievalUnavailable(
            "no index".to_string(),
        )))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "retrieval_unavailable");
    }
}
