use {
    super::compiled::{EtagMode, QueryParser, TrustProxy},
    crate::Result,
    serde_json::{Value, json},
    std::{collections::HashMap, env},
};

/// Typed companion of a setting that is compiled at `set` time.
#[derive(Debug, Clone)]
pub(crate) enum Compiled {
    Etag(EtagMode),
    Query(QueryParser),
    Trust(TrustProxy),
}

#[derive(Debug, Clone)]
pub(crate) struct Setting {
    pub(crate) value: Value,
    pub(crate) compiled: Option<Compiled>,
}

impl Setting {
    pub(crate) fn new(key: &str, value: Value) -> Result<Self> {
        let compiled = match key {
            "etag" => Some(Compiled::Etag(EtagMode::compile(&value)?)),
            "query parser" => Some(Compiled::Query(QueryParser::compile(&value)?)),
            "trust proxy" => Some(Compiled::Trust(TrustProxy::compile(&value)?)),
            _ => None,
        };
        Ok(Self { value, compiled })
    }
}

/// One application's own settings: explicit overrides and built-in defaults.
///
/// Lookup across mounted applications happens in [`Application`](crate::Application):
/// own overrides, then each ancestor's overrides, then own defaults.
#[derive(Debug)]
pub(crate) struct Settings {
    overrides: HashMap<String, Setting>,
    defaults: HashMap<String, Setting>,
}

impl Settings {
    pub(crate) fn new() -> Self {
        let env = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string());
        let views = env::current_dir()
            .map(|dir| dir.join("views").to_string_lossy().into_owned())
            .unwrap_or_else(|_| "views".to_string());

        let mut defaults = vec![
            ("x-powered-by", json!(true)),
            ("etag", json!("weak")),
            ("query parser", json!("extended")),
            ("subdomain offset", json!(2)),
            ("trust proxy", json!(false)),
            ("views", json!(views)),
            ("jsonp callback name", json!("callback")),
        ];
        if env == "production" {
            defaults.push(("view cache", json!(true)));
        }
        defaults.push(("env", json!(env)));

        let defaults = defaults
            .into_iter()
            .filter_map(|(key, value)| {
                Setting::new(key, value)
                    .ok()
                    .map(|setting| (key.to_string(), setting))
            })
            .collect();

        Self {
            overrides: HashMap::new(),
            defaults,
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let setting = Setting::new(key, value)?;
        self.overrides.insert(key.to_string(), setting);
        Ok(())
    }

    pub(crate) fn own(&self, key: &str) -> Option<&Setting> {
        self.overrides.get(key)
    }

    pub(crate) fn default_of(&self, key: &str) -> Option<&Setting> {
        self.defaults.get(key)
    }
}

/// Truthiness of a setting value: `false`, `null`, `0` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
