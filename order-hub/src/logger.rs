//! 日志初始化
//!
//! Console output is pretty or JSON. With a log directory, two daily-rotated
//! JSON files are added: `{dir}/app` gets everything except the `audit`
//! target, `{dir}/audit` gets only that target.

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const AUDIT_TARGET: &str = "audit";

fn default_filter(level: &str) -> String {
    format!("order_hub={level},shared={level},{AUDIT_TARGET}={level},tower_http=info")
}

/// JSON layer writing to `{root}/{name}/{name}.YYYY-MM-DD`, restricted to
/// events whose target equals (`audit_only`) or differs from `audit`
fn rotating_layer<S>(
    root: &Path,
    name: &str,
    audit_only: bool,
) -> std::io::Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = root.join(name);
    std::fs::create_dir_all(&dir)?;
    let writer = RollingFileAppender::new(Rotation::DAILY, dir, name);
    Ok(fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(!audit_only)
        .with_writer(std::sync::Mutex::new(writer))
        .with_filter(filter_fn(move |meta| {
            (meta.target() == AUDIT_TARGET) == audit_only
        }))
        .boxed())
}

/// `RUST_LOG` wins over `level` when present.
pub fn init_logger(level: &str, json_format: bool, log_dir: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let console = if json_format {
        fmt::layer().json().with_current_span(true).with_thread_ids(true).boxed()
    } else {
        fmt::layer().with_file(true).with_line_number(true).boxed()
    };

    let files = match log_dir.map(Path::new) {
        Some(root) => Some(
            rotating_layer(root, "app", false)?.and_then(rotating_layer(root, AUDIT_TARGET, true)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(files)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_filter_is_valid() {
        let directives = default_filter("debug");
        assert!(directives.starts_with("order_hub=debug"));
        assert!(directives.contains("audit=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
