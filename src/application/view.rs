//! View lookup and rendering.
//!
//! Template languages are not built in: register a [`ViewEngine`] per file
//! extension with [`Application::engine`] and render with
//! [`Application::render`] or [`Response::render`](crate::Response::render).
//!
//! ```rust,no_run
//! use axum_relay::{Application, Result};
//! use serde_json::{Map, Value};
//! use std::path::Path;
//!
//! # fn main() -> Result<()> {
//! let app = Application::new();
//! app.engine("txt", |path: &Path, locals: &Map<String, Value>| -> Result<String> {
//!     let template = std::fs::read_to_string(path)?;
//!     let name = locals.get("name").and_then(Value::as_str).unwrap_or("world");
//!     Ok(template.replace("{name}", name))
//! });
//! app.set("view engine", "txt")?;
//! # Ok(())
//! # }
//! ```

use {
    super::Application,
    crate::{
        Error, Result,
        utils::{read, write},
    },
    serde_json::{Map, Value},
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Renders a resolved template file with its locals.
///
/// Rendering runs on a blocking thread, so implementations may read files
/// synchronously.
pub trait ViewEngine: Send + Sync + 'static {
    fn render(&self, path: &Path, locals: &Map<String, Value>) -> Result<String>;
}

impl<F> ViewEngine for F
where
    F: Fn(&Path, &Map<String, Value>) -> Result<String> + Send + Sync + 'static,
{
    fn render(&self, path: &Path, locals: &Map<String, Value>) -> Result<String> {
        self(path, locals)
    }
}

/// A view resolved to a file and the engine that renders it.
#[derive(Clone)]
pub(crate) struct ResolvedView {
    path: PathBuf,
    engine: Arc<dyn ViewEngine>,
}

fn normalize_ext(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

impl Application {
    /// Registers `engine` for files ending in `ext` (with or without the dot).
    pub fn engine(&self, ext: &str, engine: impl ViewEngine) -> &Self {
        let ext = normalize_ext(ext);
        tracing::debug!(extension = %ext, "view engine registered");
        write(&self.inner.engines).insert(ext, Arc::new(engine));
        self
    }

    /// Renders the view `name` with the application's locals overlaid by `locals`.
    pub async fn render(&self, name: &str, locals: Map<String, Value>) -> Result<String> {
        let mut options = self.locals();
        options.extend(locals);

        let cache = self.enabled("view cache");
        let cached = if cache {
            read(&self.inner.view_cache).get(name).cloned()
        } else {
            None
        };
        let view = match cached {
            Some(view) => view,
            None => {
                let view = self.resolve_view(name).await?;
                if cache {
                    write(&self.inner.view_cache).insert(name.to_string(), view.clone());
                }
                view
            }
        };

        tracing::debug!(view = name, path = %view.path.display(), "rendering view");
        let ResolvedView { path, engine } = view;
        tokio::task::spawn_blocking(move || engine.render(&path, &options))
            .await
            .map_err(|e| Error::internal(format!("View rendering task failed: {e}")))?
    }

    async fn resolve_view(&self, name: &str) -> Result<ResolvedView> {
        let ext = Path::new(name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()));
        let default_engine = self
            .setting("view engine")
            .and_then(|v| v.as_str().map(normalize_ext));

        let (ext, file_name) = match (ext, default_engine) {
            (Some(ext), _) => (ext, name.to_string()),
            (None, Some(default)) => (default.clone(), format!("{name}{default}")),
            (None, None) => {
                return Err(Error::view(
                    "No default engine was specified and no extension was provided.",
                ));
            }
        };

        let engine = read(&self.inner.engines)
            .get(&ext)
            .cloned()
            .ok_or_else(|| Error::view(format!("No view engine registered for extension \"{ext}\"")))?;

        let roots = self.view_roots();
        for root in &roots {
            let location = Path::new(root).join(&file_name);
            if is_file(&location).await {
                return Ok(ResolvedView { path: location, engine });
            }
            let stem = location
                .file_name()
                .map(|f| f.to_string_lossy().trim_end_matches(ext.as_str()).to_string())
                .unwrap_or_default();
            let index = location
                .with_file_name(stem)
                .join(format!("index{ext}"));
            if is_file(&index).await {
                return Ok(ResolvedView { path: index, engine });
            }
        }

        let dirs = match roots.as_slice() {
            [.., last] if roots.len() > 1 => format!(
                "directories \"{}\" or \"{last}\"",
                roots[..roots.len() - 1].join("\", \"")
            ),
            _ => format!("directory \"{}\"", roots.join("")),
        };
        Err(Error::view(format!(
            "Failed to lookup view \"{name}\" in views {dirs}"
        )))
    }

    /// The `views` setting as a list of directories.
    fn view_roots(&self) -> Vec<String> {
        match self.setting("views") {
            Some(Value::String(dir)) => vec![dir],
            Some(Value::Array(dirs)) => dirs
                .into_iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}
