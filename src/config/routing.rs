use serde::Deserialize;

///
/// Matching behaviour of a [`Router`](crate::Router).
///
/// The same options are read from the `[routing]` section of a [`Config`](crate::Config),
/// where they configure the root router of the application.
///
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct RouterOptions {
    /// When true, `/Foo` and `/foo` are different routes.
    /// By default matching is case-insensitive.
    #[serde(default)]
    pub case_sensitive: bool,

    /// When true, `/foo` and `/foo/` are different routes.
    /// By default a single trailing slash is ignored.
    #[serde(default)]
    pub strict: bool,

    /// When true, a mounted router sees the params captured by the layers
    /// that led to it. Only meaningful for routers mounted below a parameterized path.
    #[serde(default)]
    pub merge_params: bool,
}

impl RouterOptions {
    pub fn with_case_sensitive(mut self, enable: bool) -> Self {
        self.case_sensitive = enable;
        self
    }

    pub fn with_strict(mut self, enable: bool) -> Self {
        self.strict = enable;
        self
    }

    pub fn with_merge_params(mut self, enable: bool) -> Self {
        self.merge_params = enable;
        self
    }
}
