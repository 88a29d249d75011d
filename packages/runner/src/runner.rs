//! The conversion run.

use std::path::PathBuf;
use std::sync::Arc;

use aip_airac::Airac;
use aip_document::Document;
use aip_parser::progress::{ProgressCallback, null_progress};
use aip_parser::{
    ParseContext, ParseError, RegionResources, SectionDescriptor, SectionRegistry, Warnings,
};
use aip_source::{DownloadCache, HttpClient, HttpSettings};

use crate::{Config, RunnerError, paths, region, schema};

/// What to convert and how.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Region code, e.g. `DEMO`.
    pub region: String,
    /// Scope within the region, e.g. `AIP`.
    pub scope: String,
    /// Only this section and its prerequisites. `None` runs all sections.
    pub section: Option<String>,
    /// Cycle to convert.
    pub airac: Airac,
    /// Storage root for config and download caches.
    pub storage: PathBuf,
    /// Directory of region resources.
    pub regions: PathBuf,
    /// Directory the document and manifest are written to.
    pub output: PathBuf,
    /// Do not persist downloaded documents.
    pub clean: bool,
    /// Write the document even if it fails validation.
    pub force: bool,
    /// Continue with the next section when one fails.
    pub keep_going: bool,
    /// Write outputs even when no feature was produced.
    pub write_empty: bool,
    /// HTTP client settings for remote origins.
    pub http: HttpSettings,
}

impl RunOptions {
    /// Options for `region` and `scope` with default directories and
    /// flags, converting `airac`.
    #[must_use]
    pub fn new(region: &str, scope: &str, airac: Airac) -> Self {
        Self {
            region: region.to_owned(),
            scope: scope.to_owned(),
            section: None,
            airac,
            storage: paths::default_storage_dir(),
            regions: paths::default_regions_dir(),
            output: paths::default_output_dir(),
            clean: false,
            force: false,
            keep_going: false,
            write_empty: false,
            http: HttpSettings::default(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Sections that parsed successfully, in run order.
    pub sections: Vec<String>,
    /// Sections that failed but were skipped.
    pub failed: Vec<String>,
    /// Number of features in the document.
    pub features: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Written XML document, if any.
    pub output: Option<PathBuf>,
    /// Written manifest, if any.
    pub manifest: Option<PathBuf>,
}

/// Runs the sections of one region and scope.
pub struct Runner<'r> {
    registry: &'r SectionRegistry,
    options: RunOptions,
    progress: Arc<dyn ProgressCallback>,
    warnings: Warnings,
}

impl<'r> Runner<'r> {
    /// Creates a runner over `registry`.
    #[must_use]
    pub fn new(registry: &'r SectionRegistry, options: RunOptions) -> Self {
        Self {
            registry,
            options,
            progress: null_progress(),
            warnings: Warnings::new(),
        }
    }

    /// Reports section progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Warnings counted so far, including those of a failed run.
    #[must_use]
    pub const fn warnings(&self) -> usize {
        self.warnings.count()
    }

    /// Runs the conversion.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`RunnerError`]. Sections completed before
    /// it stay in the download cache archive.
    pub async fn run(&mut self) -> Result<RunReport, RunnerError> {
        let mut config = self.read_config()?;
        let resources = self.read_region()?;
        let order = self.read_parsers()?;

        let mut document = Document::new(
            config.namespace(),
            &self.options.airac.to_string(),
            &self.options.region,
        );
        schema::require_fields(&mut document);

        let mut report = self
            .parse_sections(&order, &resources, &mut document)
            .await?;

        if document.is_empty() && !self.options.write_empty {
            log::warn!("No features produced, nothing written");
        } else {
            self.validate_document(&document)?;
            self.write_outputs(&document, &mut report)?;
            self.write_config(&mut config)?;
        }

        report.features = document.len();
        report.warnings = self.warnings.count();

        log::info!(
            "Finished {}/{}: {} sections, {} features, {} warnings",
            self.options.region,
            self.options.scope,
            report.sections.len(),
            report.features,
            report.warnings,
        );

        Ok(report)
    }

    fn read_config(&self) -> Result<Config, RunnerError> {
        paths::ensure_dir(&self.options.storage).map_err(RunnerError::io(&self.options.storage))?;
        Config::load(&paths::config_path(&self.options.storage))
    }

    fn read_region(&self) -> Result<RegionResources, RunnerError> {
        region::load(&self.options.regions, &self.options.region)
    }

    /// Sections to run, in dependency order.
    fn read_parsers(&self) -> Result<Vec<SectionDescriptor>, RunnerError> {
        let region = &self.options.region;
        let scope = &self.options.scope;
        let graph = self.registry.dependency_graph(region, scope)?;

        let names = match &self.options.section {
            Some(section) => graph.tsort_for(section)?,
            None => graph.tsort()?,
        };

        let mut order = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(descriptor) = self.registry.section(region, scope, name)? {
                order.push(*descriptor);
            }
        }

        log::info!("Section order: {}", names.join(", "));

        Ok(order)
    }

    async fn parse_sections(
        &mut self,
        order: &[SectionDescriptor],
        resources: &RegionResources,
        document: &mut Document,
    ) -> Result<RunReport, RunnerError> {
        let storage = paths::region_storage_dir(&self.options.storage, &self.options.region);
        paths::ensure_dir(&storage).map_err(RunnerError::io(&storage))?;

        let http = HttpClient::new(&self.options.http)?;
        let mut cache = DownloadCache::open(
            &storage,
            &self.options.airac.to_string(),
            self.options.clean,
            http,
        )?;

        let mut report = RunReport::default();
        self.progress.set_total(order.len() as u64);

        for descriptor in order {
            self.progress.set_message(descriptor.name.to_string());
            log::info!("Parsing section {}", descriptor.name);

            let result = parse_section(
                descriptor,
                &mut cache,
                document,
                resources,
                &mut self.warnings,
                self.options.airac,
            )
            .await;

            match result {
                Ok(()) => report.sections.push(descriptor.name.to_owned()),
                Err(e) if self.options.keep_going => {
                    self.warnings
                        .warn(descriptor.name, format!("section failed, skipped: {e}"));
                    report.failed.push(descriptor.name.to_owned());
                }
                Err(e) => {
                    return Err(RunnerError::Section {
                        section: descriptor.name.to_owned(),
                        source: e,
                    });
                }
            }

            self.progress.inc(1);
        }

        cache.close()?;
        self.progress.finish(format!("{} sections", report.sections.len()));

        Ok(report)
    }

    fn validate_document(&mut self, document: &Document) -> Result<(), RunnerError> {
        let mut problems = Vec::new();

        for duplicate in document.duplicates() {
            problems.push(format!(
                "duplicate {} (source: {})",
                duplicate.label(),
                duplicate.source().unwrap_or("unknown")
            ));
        }
        for error in document.errors() {
            problems.push(format!("invalid {error}"));
        }

        if problems.is_empty() {
            return Ok(());
        }

        if self.options.force {
            for problem in &problems {
                self.warnings.warn("validation", problem);
            }
            return Ok(());
        }

        for problem in &problems {
            log::error!("[validation] {problem}");
        }
        Err(RunnerError::Validation {
            count: problems.len(),
        })
    }

    fn write_outputs(&self, document: &Document, report: &mut RunReport) -> Result<(), RunnerError> {
        let output = &self.options.output;
        paths::ensure_dir(output).map_err(RunnerError::io(output))?;

        let stem = paths::output_stem(
            self.options.airac,
            &self.options.region,
            &self.options.scope,
            self.options.section.as_deref(),
        );

        let document_path = paths::document_path(output, &stem);
        std::fs::write(&document_path, document.to_xml()?)
            .map_err(RunnerError::io(&document_path))?;
        log::info!("Wrote {}", document_path.display());

        let manifest_path = paths::manifest_path(output, &stem);
        let mut manifest = csv::Writer::from_path(&manifest_path)?;
        manifest.write_record(["type", "id", "source"])?;
        for feature in document.features() {
            manifest.write_record([
                feature.kind(),
                feature.id(),
                feature.source().unwrap_or_default(),
            ])?;
        }
        manifest.flush().map_err(RunnerError::io(&manifest_path))?;

        report.output = Some(document_path);
        report.manifest = Some(manifest_path);

        Ok(())
    }

    fn write_config(&self, config: &mut Config) -> Result<(), RunnerError> {
        config.set(
            "last_airac",
            toml::Value::String(self.options.airac.to_string()),
        );
        config.save()
    }
}

/// Parses one section with its patches attached, detaching them whatever
/// the outcome.
async fn parse_section(
    descriptor: &SectionDescriptor,
    cache: &mut DownloadCache,
    document: &mut Document,
    resources: &RegionResources,
    warnings: &mut Warnings,
    airac: Airac,
) -> Result<(), ParseError> {
    let mut parser = (descriptor.factory)();
    let mut ctx = ParseContext::new(cache, document, resources, warnings, airac, descriptor.name);

    ctx.attach_patches((descriptor.patches)())?;
    let result = parser.parse(&mut ctx).await;
    ctx.detach_patches();

    result
}
