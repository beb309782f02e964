use asmref_identity::IdentityParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The global assembly cache location cannot be determined. This is the
    /// only condition that aborts a resolution session.
    #[error("cannot determine the global assembly cache location (tried {tried})")]
    EnvironmentMissing { tried: String },

    #[error("invalid assembly reference `{reference}`: {source}")]
    InvalidReference {
        reference: String,
        #[source]
        source: IdentityParseError,
    },
}

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;
