#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("assembly name is empty")]
    EmptyName,

    #[error("invalid assembly version `{0}`")]
    InvalidVersion(String),

    #[error("invalid public key token `{0}`")]
    InvalidPublicKeyToken(String),

    #[error("malformed display name component `{0}`")]
    MalformedComponent(String),
}
