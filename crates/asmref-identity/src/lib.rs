//! Assembly identities and the rules for comparing them.
//!
//! An [`AssemblyIdentity`] is the parsed form of a display name such as
//! `Foo, Version=1.2.0.0, Culture=neutral, PublicKeyToken=0123456789abcdef`.
//! String metadata (versions, tokens, cultures) is parsed once here so the
//! resolvers downstream only ever see typed values.

mod error;
mod identity;
mod matcher;
mod normalize;
mod version;

pub use crate::error::IdentityParseError;
pub use crate::identity::{AssemblyIdentity, PublicKeyToken, NEUTRAL_CULTURE};
pub use crate::matcher::{default_specific_version, is_compatible};
pub use crate::normalize::{assembly_lookup_key, normalize_full_name};
pub use crate::version::AssemblyVersion;
