//! Configuration types for a batch run.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Settings arrive in layers: command-line flags (and
//! their `SHEET2PDF_*` environment variables) override a TOML file, which
//! overrides built-in defaults. Each layer is a [`ConfigLayer`] of optional
//! values; [`ConfigLayer::resolve`] folds the merged layer into a validated
//! config.
//!
//! # Design choice: builder over constructor
//! Library callers set the three required locators and rely on documented
//! defaults for the rest. Locators are parsed once in `build()` so a bad URL
//! fails before any scratch directory is touched.

use crate::error::Sheet2PdfError;
use crate::progress::ProgressCallback;
use crate::retry::DEFAULT_REMOTE_PAUSE;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "sheet2pdf.toml";

/// URL prefix that marks a template as a hosted presentation.
const SLIDES_URL_PREFIX: &str = "https://docs.google.com/presentation";

static SPREADSHEET_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").unwrap());
static SHEET_GID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#&?]gid=(\d+)").unwrap());
static PRESENTATION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/presentation/d/([A-Za-z0-9_-]+)").unwrap());
static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

// ── Locators ─────────────────────────────────────────────────────────────

/// A worksheet inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLocator {
    pub spreadsheet_id: String,
    /// Worksheet id from the `#gid=` fragment; 0 (the first sheet) when absent.
    pub gid: u64,
}

impl SheetLocator {
    /// Parse a spreadsheet URL such as
    /// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=<n>`.
    pub fn parse(url: &str) -> Result<Self, Sheet2PdfError> {
        let invalid = |reason: &str| Sheet2PdfError::InvalidLocator {
            kind: "sheet",
            value: url.to_string(),
            reason: reason.to_string(),
        };
        let spreadsheet_id = SPREADSHEET_ID
            .captures(url)
            .map(|c| c[1].to_string())
            .ok_or_else(|| invalid("expected a URL containing /spreadsheets/d/<id>"))?;
        let gid = match SHEET_GID.captures(url) {
            Some(c) => c[1]
                .parse()
                .map_err(|_| invalid("gid is not a valid number"))?,
            None => 0,
        };
        Ok(Self {
            spreadsheet_id,
            gid,
        })
    }
}

/// Where the template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A hosted presentation, exported as PPTX at run time.
    Remote { id: String },
    /// A `.pptx` file on disk.
    Local(PathBuf),
}

impl TemplateSource {
    /// Slides URLs become [`TemplateSource::Remote`]; anything else is a path.
    pub fn parse(value: &str) -> Result<Self, Sheet2PdfError> {
        if !value.starts_with(SLIDES_URL_PREFIX) {
            return Ok(Self::Local(PathBuf::from(value)));
        }
        PRESENTATION_ID
            .captures(value)
            .map(|c| Self::Remote { id: c[1].to_string() })
            .ok_or_else(|| Sheet2PdfError::InvalidLocator {
                kind: "template",
                value: value.to_string(),
                reason: "expected a URL containing /presentation/d/<id>".into(),
            })
    }
}

/// Folder id from a Drive folder URL (last path segment) or a bare id.
pub fn parse_folder_id(value: &str) -> Result<String, Sheet2PdfError> {
    let without_query = value.split(['?', '#']).next().unwrap_or_default();
    let candidate = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if BARE_ID.is_match(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(Sheet2PdfError::InvalidLocator {
            kind: "output folder",
            value: value.to_string(),
            reason: "expected a folder URL or folder id".into(),
        })
    }
}

// ── Platform defaults ────────────────────────────────────────────────────

/// LibreOffice binary name for this platform.
pub fn default_libreoffice() -> &'static str {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        "soffice"
    } else {
        "libreoffice"
    }
}

/// Ghostscript binary name for this platform.
pub fn default_ghostscript() -> &'static str {
    if cfg!(target_os = "windows") {
        "gswin32c"
    } else {
        "gs"
    }
}

// ── BatchConfig ──────────────────────────────────────────────────────────

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use edgequake_sheet2pdf::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .sheet("https://docs.google.com/spreadsheets/d/abc123/edit#gid=42")
///     .template("template.pptx")
///     .output("https://drive.google.com/drive/folders/xyz789")
///     .resolution(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.sheet.gid, 42);
/// assert_eq!(config.output_folder, "xyz789");
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Worksheet holding one row per output document.
    pub sheet: SheetLocator,

    /// Template presentation.
    pub template: TemplateSource,

    /// Drive folder receiving the finished PDFs.
    pub output_folder: String,

    /// Ghostscript output resolution in DPI. Default: 300.
    pub resolution: u32,

    /// LibreOffice binary. Default: `soffice` on macOS/Windows, `libreoffice` elsewhere.
    pub libreoffice: PathBuf,

    /// Ghostscript binary. Default: `gswin32c` on Windows, `gs` elsewhere.
    pub ghostscript: PathBuf,

    /// Directory holding the `_output/` and `results/` scratch directories. Default: `.`.
    pub work_dir: PathBuf,

    /// Authorized-user credentials file. Default: `credentials.json`.
    pub credentials: PathBuf,

    /// Pause between retries of remote calls. Default: 1 s.
    pub retry_pause: Duration,

    /// Grant anyone-with-the-link read access to the output folder. Default: false.
    pub share_output: bool,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("sheet", &self.sheet)
            .field("template", &self.template)
            .field("output_folder", &self.output_folder)
            .field("resolution", &self.resolution)
            .field("libreoffice", &self.libreoffice)
            .field("ghostscript", &self.ghostscript)
            .field("work_dir", &self.work_dir)
            .field("credentials", &self.credentials)
            .field("retry_pause", &self.retry_pause)
            .field("share_output", &self.share_output)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    sheet: Option<String>,
    template: Option<String>,
    output: Option<String>,
    resolution: u32,
    libreoffice: PathBuf,
    ghostscript: PathBuf,
    work_dir: PathBuf,
    credentials: PathBuf,
    retry_pause: Duration,
    share_output: bool,
    progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        Self {
            sheet: None,
            template: None,
            output: None,
            resolution: 300,
            libreoffice: PathBuf::from(default_libreoffice()),
            ghostscript: PathBuf::from(default_ghostscript()),
            work_dir: PathBuf::from("."),
            credentials: PathBuf::from("credentials.json"),
            retry_pause: DEFAULT_REMOTE_PAUSE,
            share_output: false,
            progress_callback: None,
        }
    }
}

impl BatchConfigBuilder {
    pub fn sheet(mut self, url: impl Into<String>) -> Self {
        self.sheet = Some(url.into());
        self
    }

    pub fn template(mut self, url_or_path: impl Into<String>) -> Self {
        self.template = Some(url_or_path.into());
        self
    }

    pub fn output(mut self, folder: impl Into<String>) -> Self {
        self.output = Some(folder.into());
        self
    }

    pub fn resolution(mut self, dpi: u32) -> Self {
        self.resolution = dpi;
        self
    }

    pub fn libreoffice(mut self, binary: impl Into<PathBuf>) -> Self {
        self.libreoffice = binary.into();
        self
    }

    pub fn ghostscript(mut self, binary: impl Into<PathBuf>) -> Self {
        self.ghostscript = binary.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn credentials(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials = path.into();
        self
    }

    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn share_output(mut self, share: bool) -> Self {
        self.share_output = share;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, parsing locators and validating constraints.
    pub fn build(self) -> Result<BatchConfig, Sheet2PdfError> {
        let sheet = self
            .sheet
            .ok_or(Sheet2PdfError::MissingSetting { name: "sheet" })?;
        let template = self
            .template
            .ok_or(Sheet2PdfError::MissingSetting { name: "template" })?;
        let output = self
            .output
            .ok_or(Sheet2PdfError::MissingSetting { name: "output" })?;

        if self.resolution == 0 || self.resolution > 2400 {
            return Err(Sheet2PdfError::InvalidConfig(format!(
                "Resolution must be 1–2400 DPI, got {}",
                self.resolution
            )));
        }

        Ok(BatchConfig {
            sheet: SheetLocator::parse(&sheet)?,
            template: TemplateSource::parse(&template)?,
            output_folder: parse_folder_id(&output)?,
            resolution: self.resolution,
            libreoffice: self.libreoffice,
            ghostscript: self.ghostscript,
            work_dir: self.work_dir,
            credentials: self.credentials,
            retry_pause: self.retry_pause,
            share_output: self.share_output,
            progress_callback: self.progress_callback,
        })
    }
}

// ── Layered settings ─────────────────────────────────────────────────────

/// One layer of optional settings: a TOML file or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub sheet: Option<String>,
    pub template: Option<String>,
    pub output: Option<String>,
    pub resolution: Option<u32>,
    pub libreoffice: Option<PathBuf>,
    pub gs: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
    pub retry_pause_ms: Option<u64>,
    pub share_output: Option<bool>,
}

impl ConfigLayer {
    /// Parse a TOML document; `origin` names it in error messages.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, Sheet2PdfError> {
        toml::from_str(text).map_err(|e| Sheet2PdfError::ConfigFile {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, Sheet2PdfError> {
        let text = std::fs::read_to_string(path).map_err(|e| Sheet2PdfError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load `explicit` (which must exist), or [`DEFAULT_CONFIG_FILE`] if it
    /// exists in the current directory, or an empty layer.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, Sheet2PdfError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Fill every unset value in `self` from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            sheet: self.sheet.or(lower.sheet),
            template: self.template.or(lower.template),
            output: self.output.or(lower.output),
            resolution: self.resolution.or(lower.resolution),
            libreoffice: self.libreoffice.or(lower.libreoffice),
            gs: self.gs.or(lower.gs),
            work_dir: self.work_dir.or(lower.work_dir),
            credentials: self.credentials.or(lower.credentials),
            retry_pause_ms: self.retry_pause_ms.or(lower.retry_pause_ms),
            share_output: self.share_output.or(lower.share_output),
        }
    }

    /// Turn the layer into a builder, keeping defaults for unset values.
    pub fn into_builder(self) -> BatchConfigBuilder {
        let mut builder = BatchConfig::builder();
        if let Some(v) = self.sheet {
            builder = builder.sheet(v);
        }
        if let Some(v) = self.template {
            builder = builder.template(v);
        }
        if let Some(v) = self.output {
            builder = builder.output(v);
        }
        if let Some(v) = self.resolution {
            builder = builder.resolution(v);
        }
        if let Some(v) = self.libreoffice {
            builder = builder.libreoffice(v);
        }
        if let Some(v) = self.gs {
            builder = builder.ghostscript(v);
        }
        if let Some(v) = self.work_dir {
            builder = builder.work_dir(v);
        }
        if let Some(v) = self.credentials {
            builder = builder.credentials(v);
        }
        if let Some(v) = self.retry_pause_ms {
            builder = builder.retry_pause(Duration::from_millis(v));
        }
        if let Some(v) = self.share_output {
            builder = builder.share_output(v);
        }
        builder
    }

    /// Validate into a [`BatchConfig`].
    pub fn resolve(self) -> Result<BatchConfig, Sheet2PdfError> {
        self.into_builder().build()
    }
}
