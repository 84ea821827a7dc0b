//! Request and response handles passed to every handler.
//!
//! Both are cheap `Clone` handles over shared state, so a handler can keep
//! them across `.await` points and hand them to spawned work. While an
//! [`Application`](crate::Application) dispatches a request, it installs its
//! [`AppContext`] on the request; settings-driven behaviour (query parsing,
//! ETags, proxy trust, JSON formatting) reads from there.

mod query;
mod request;
mod response;

pub use request::*;
pub use response::*;

use crate::{Application, EtagMode, QueryParser, TrustProxy};

/// Settings of the dispatching application, compiled once per dispatch.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub(crate) app: Option<Application>,
    pub(crate) etag: EtagMode,
    pub(crate) query_parser: QueryParser,
    pub(crate) trust_proxy: TrustProxy,
    pub(crate) subdomain_offset: usize,
    pub(crate) json_spaces: Option<String>,
    pub(crate) json_escape: bool,
    pub(crate) jsonp_callback: String,
}

impl Default for AppContext {
    fn default() -> Self {
        Self {
            app: None,
            etag: EtagMode::default(),
            query_parser: QueryParser::default(),
            trust_proxy: TrustProxy::default(),
            subdomain_offset: 2,
            json_spaces: None,
            json_escape: false,
            jsonp_callback: "callback".to_string(),
        }
    }
}

impl AppContext {
    pub fn app(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    pub fn etag(&self) -> EtagMode {
        self.etag
    }

    pub fn query_parser(&self) -> QueryParser {
        self.query_parser
    }

    pub fn trust_proxy(&self) -> &TrustProxy {
        &self.trust_proxy
    }
}
