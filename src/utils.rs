use indicatif::ProgressStyle;
use indicatif::style::TemplateError;

/// Style of the progress bar attached to the span of a running collection.
pub(crate) fn get_style_tasks() -> Result<ProgressStyle, TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=>-"))
}

/// Installs a global `tracing` subscriber which prints events to stderr and
/// renders the progress of running collections.
///
/// The filter is read from `RUST_LOG` and defaults to `kumiki=info`.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), crate::KumikiError> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let indicatif_layer = IndicatifLayer::new();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kumiki=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .try_init()?;

    Ok(())
}
