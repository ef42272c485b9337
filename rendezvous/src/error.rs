use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum RendezvousError {
    #[error("channel not found")]
    ChannelNotFound,
    #[error("caller is neither the exposer nor the entrance of this channel")]
    RoleConflict,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("channel id already in use")]
    DuplicateChannel,
}

impl IntoResponse for RendezvousError {
    fn into_response(self) -> Response {
        let status = match &self {
            RendezvousError::ChannelNotFound => StatusCode::NOT_FOUND,
            RendezvousError::RoleConflict => StatusCode::FORBIDDEN,
            RendezvousError::Malformed(_) => StatusCode::BAD_REQUEST,
            RendezvousError::DuplicateChannel => StatusCode::CONFLICT,
        };
        (status, self.to_string()).into_response()
    }
}
