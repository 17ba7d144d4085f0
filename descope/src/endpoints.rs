//! Where the identity platform is reached

use crate::{ProjectId, ProjectIdRef};

/// The root domain of the hosted identity platform
pub const DEFAULT_ROOT_DOMAIN: &str = "descope.com";

/// The URLs used to reach the identity platform for a single project
///
/// Built once per client and shared by every component that calls out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
    project_id: ProjectId,
}

impl Endpoints {
    /// Derives the endpoints for `project_id`
    ///
    /// An explicit `base_url` always wins. Otherwise the URL is
    /// `https://api.<root_domain>`, with the project's region inserted as a
    /// subdomain when the identifier carries one.
    pub fn new(project_id: &ProjectIdRef, base_url: Option<&str>, root_domain: &str) -> Self {
        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => derive_base_url(project_id, root_domain),
        };

        Self {
            base_url,
            project_id: project_id.to_owned(),
        }
    }

    /// The base URL all requests are made against
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The project these endpoints serve
    #[inline]
    pub fn project_id(&self) -> &ProjectIdRef {
        &self.project_id
    }

    /// The project's public key set
    pub fn public_keys(&self) -> String {
        format!("{}/v2/keys/{}", self.base_url, self.project_id)
    }

    /// The details of the user owning a refresh token
    pub fn me(&self) -> String {
        self.url("/v1/auth/me")
    }

    /// Resolves a path against the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn derive_base_url(project_id: &ProjectIdRef, root_domain: &str) -> String {
    match project_id.region() {
        Some(region) => format!("https://api.{}.{}", region, root_domain),
        None => format!("https://api.{}", root_domain),
    }
}
