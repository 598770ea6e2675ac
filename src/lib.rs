pub mod access;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod resource;
pub mod review;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use manager::{from_in_cluster_config, AuthManager, AuthScheme};
pub use resource::{GroupResource, ResourceAction, ResourceMap, ResourceType, ResourceVerb};
pub use review::UserInfo;

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{
        AuthConfig, AuthError, AuthManager, AuthScheme, GroupResource, ResourceAction, ResourceMap,
        ResourceType, ResourceVerb, UserInfo,
    };
}
