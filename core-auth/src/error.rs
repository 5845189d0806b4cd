use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("User {user_id} is not authenticated with {service}")]
    NotAuthenticated { user_id: String, service: String },

    #[error("Tokens for user {user_id} on {service} have expired")]
    TokenExpired { user_id: String, service: String },

    #[error("Invalid user/service reference: {0}")]
    InvalidReference(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
