//! MCP Server implementation using rmcp

use crate::error::{Error, Result};
use crate::pdf::{
    fallback_scale, FieldValue, FieldValueMap, FillReport, FormDocument, PageRenderer,
    PdfiumRenderer, ValidationReport,
};
use crate::profile::{merge_profile, ProfileStore};
use crate::source::{display_name, read_pdf, resolve_path};
use crate::tabular::{self, CsvRecord};
use base64::Engine;
use rmcp::{
    model::*, schemars::JsonSchema, service::RequestContext, RoleServer, ServerHandler,
    ServiceExt,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Environment variable overriding the default PDF directory
pub const PDF_DIR_ENV: &str = "PDF_FILLER_PDF_DIR";
/// Environment variable overriding the profile directory
pub const PROFILE_DIR_ENV: &str = "PDF_FILLER_PROFILE_DIR";

/// URI scheme for PDF resources
pub const PDF_URI_SCHEME: &str = "pdf://";

const PDF_MIME_TYPE: &str = "application/pdf";
const PNG_MIME_TYPE: &str = "image/png";

/// Column holding the source file name in CSV exports
const FILENAME_COLUMN: &str = "_filename";

/// Empty fields listed in full by `validate_pdf`
const EMPTY_FIELDS_SHOWN: usize = 10;

/// Directory configuration for the PDF Filler MCP Server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory searched by `list_pdfs` when no directory is given
    pub default_pdf_dir: PathBuf,
    /// Directory holding saved profiles
    pub profile_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            default_pdf_dir: home.join("Documents"),
            profile_dir: home.join(".pdf-filler-profiles"),
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `PDF_FILLER_PDF_DIR` / `PDF_FILLER_PROFILE_DIR`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_dir(PDF_DIR_ENV) {
            config.default_pdf_dir = dir;
        }
        if let Some(dir) = env_dir(PROFILE_DIR_ENV) {
            config.profile_dir = dir;
        }
        config
    }
}

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| resolve_path(&v))
}

// ============================================================================
// Tool results
// ============================================================================

/// One content item of a tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    /// Base64-encoded image
    Image { data: String, mime_type: String },
}

/// Result of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
        }
    }

    /// Uniform error rendering: `Error: <message>`
    pub fn error(err: &Error) -> Self {
        Self::text(format!("Error: {}", err))
    }

    /// Text of the first text item, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ToolContent::Text(t) => Some(t.as_str()),
            ToolContent::Image { .. } => None,
        })
    }
}

impl From<ToolOutput> for CallToolResult {
    fn from(output: ToolOutput) -> Self {
        let content = output
            .content
            .into_iter()
            .map(|item| match item {
                ToolContent::Text(text) => Content::text(text),
                ToolContent::Image { data, mime_type } => Content::image(data, mime_type),
            })
            .collect();
        CallToolResult::success(content)
    }
}

// ============================================================================
// Tool parameters
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListPdfsParams {
    /// Directory path to search for PDFs (default: ~/Documents)
    #[serde(default)]
    pub directory: Option<String>,
    /// Search subdirectories recursively (default: false)
    #[serde(default)]
    pub recursive: bool,
    /// Filename pattern to filter (e.g., "invoice*.pdf"). Supports glob patterns.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadPdfFieldsParams {
    /// Path to the PDF file
    pub pdf_path: String,
    /// Password for encrypted PDFs (optional)
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillPdfParams {
    /// Path to the PDF template
    pub pdf_path: String,
    /// Path where the filled PDF should be saved
    pub output_path: String,
    /// Object mapping field names to values
    pub field_data: FieldValueMap,
    /// Password for encrypted PDFs (optional)
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BulkFillFromCsvParams {
    /// Path to the PDF template
    pub pdf_path: String,
    /// Path to CSV file with data
    pub csv_path: String,
    /// Directory to save filled PDFs
    pub output_directory: String,
    /// CSV column to use for output filenames (optional)
    #[serde(default)]
    pub filename_column: Option<String>,
    /// Password for encrypted PDFs (optional)
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveProfileParams {
    /// Name for the profile
    pub profile_name: String,
    /// Field data to save
    pub field_data: FieldValueMap,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadProfileParams {
    /// Name of the profile to load
    pub profile_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListProfilesParams {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillWithProfileParams {
    /// Path to the PDF template
    pub pdf_path: String,
    /// Path where the filled PDF should be saved
    pub output_path: String,
    /// Name of the profile to use
    pub profile_name: String,
    /// Additional field data to merge with profile (optional, wins on conflict)
    #[serde(default)]
    pub additional_data: Option<FieldValueMap>,
    /// Password for encrypted PDFs (optional)
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractToCsvParams {
    /// Array of PDF file paths
    pub pdf_paths: Vec<String>,
    /// Output CSV file path
    pub output_csv: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidatePdfParams {
    /// Path to the PDF file
    pub pdf_path: String,
    /// Password for encrypted PDFs (optional)
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadPdfContentParams {
    /// Path to the PDF file to read
    pub pdf_path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPdfResourceUriParams {
    /// Path to the PDF file
    pub pdf_path: String,
}

// ============================================================================
// Tool catalog
// ============================================================================

/// A catalog entry: name, description and input schema
struct ToolSpec {
    name: &'static str,
    description: &'static str,
    schema: Arc<JsonObject>,
}

impl ToolSpec {
    fn new<T: JsonSchema>(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            schema: input_schema::<T>(),
        }
    }

    /// Property names listed in the schema's `required` array
    fn required(&self) -> impl Iterator<Item = &str> {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    fn to_tool(&self) -> Tool {
        Tool::new(self.name, self.description, self.schema.clone())
    }
}

fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(Value::Object(map)) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new::<ListPdfsParams>(
            "list_pdfs",
            "List all PDF files in a directory. Supports recursive search and glob pattern filtering.",
        ),
        ToolSpec::new::<ReadPdfFieldsParams>(
            "read_pdf_fields",
            "Read all form fields from a PDF file",
        ),
        ToolSpec::new::<FillPdfParams>(
            "fill_pdf",
            "Fill a PDF form with provided data",
        ),
        ToolSpec::new::<BulkFillFromCsvParams>(
            "bulk_fill_from_csv",
            "Fill multiple PDFs using data from a CSV file",
        ),
        ToolSpec::new::<SaveProfileParams>(
            "save_profile",
            "Save field data as a reusable profile",
        ),
        ToolSpec::new::<LoadProfileParams>("load_profile", "Load a saved profile"),
        ToolSpec::new::<ListProfilesParams>("list_profiles", "List all saved profiles"),
        ToolSpec::new::<FillWithProfileParams>(
            "fill_with_profile",
            "Fill a PDF using a saved profile",
        ),
        ToolSpec::new::<ExtractToCsvParams>(
            "extract_to_csv",
            "Extract form data from filled PDFs to CSV",
        ),
        ToolSpec::new::<ValidatePdfParams>(
            "validate_pdf",
            "Validate if all required fields in a PDF are filled",
        ),
        ToolSpec::new::<ReadPdfContentParams>(
            "read_pdf_content",
            "Read the full content of a PDF file including text. \
             Scanned documents without a text layer return page 1 as an image.",
        ),
        ToolSpec::new::<GetPdfResourceUriParams>(
            "get_pdf_resource_uri",
            "Get a resource URI for a PDF file that can be read through the Resources API",
        ),
    ]
}

// ============================================================================
// Server
// ============================================================================

/// PDF Filler MCP Server
#[derive(Clone)]
pub struct PdfFillerServer {
    config: Arc<ServerConfig>,
    profiles: ProfileStore,
    renderer: Option<Arc<dyn PageRenderer>>,
    tools: Arc<Vec<ToolSpec>>,
    /// Serializes tool calls: one request at a time
    dispatch_lock: Arc<Mutex<()>>,
}

impl PdfFillerServer {
    /// Create a server, probing for PDFium once
    pub fn new(config: ServerConfig) -> Self {
        let renderer: Option<Arc<dyn PageRenderer>> = match PdfiumRenderer::probe() {
            Ok(renderer) => Some(Arc::new(renderer)),
            Err(e) => {
                tracing::info!(error = %e, "page rendering unavailable, scanned PDFs return text only");
                None
            }
        };
        Self::with_renderer(config, renderer)
    }

    /// Create a server with an explicit rendering capability
    pub fn with_renderer(config: ServerConfig, renderer: Option<Arc<dyn PageRenderer>>) -> Self {
        let profiles = ProfileStore::new(config.profile_dir.clone());
        Self {
            config: Arc::new(config),
            profiles,
            renderer,
            tools: Arc::new(tool_catalog()),
            dispatch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Tool definitions advertised by `tools/list`
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolSpec::to_tool).collect()
    }

    /// Run one tool call to completion.
    ///
    /// Never fails: every error is rendered as `Error: <message>` text.
    pub async fn dispatch(&self, name: &str, args: JsonObject) -> ToolOutput {
        let _guard = self.dispatch_lock.lock().await;
        tracing::debug!(tool = name, "tool call");

        let server = self.clone();
        let tool = name.to_string();
        let result = tokio::task::spawn_blocking(move || server.call(&tool, args))
            .await
            .unwrap_or_else(|e| {
                Err(Error::TaskJoin {
                    reason: e.to_string(),
                })
            });

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, tool = name, "tool call failed");
            ToolOutput::error(&e)
        })
    }

    fn call(&self, name: &str, args: JsonObject) -> Result<ToolOutput> {
        let spec = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::UnknownTool {
                name: name.to_string(),
            })?;

        for field in spec.required() {
            if args.get(field).map_or(true, Value::is_null) {
                return Err(Error::MissingArgument {
                    tool: name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        match name {
            "list_pdfs" => self.list_pdfs(parse_args(name, args)?),
            "read_pdf_fields" => self.read_pdf_fields(parse_args(name, args)?),
            "fill_pdf" => self.fill_pdf(parse_args(name, args)?),
            "bulk_fill_from_csv" => self.bulk_fill_from_csv(parse_args(name, args)?),
            "save_profile" => self.save_profile(parse_args(name, args)?),
            "load_profile" => self.load_profile(parse_args(name, args)?),
            "list_profiles" => self.list_profiles(),
            "fill_with_profile" => self.fill_with_profile(parse_args(name, args)?),
            "extract_to_csv" => self.extract_to_csv(parse_args(name, args)?),
            "validate_pdf" => self.validate_pdf(parse_args(name, args)?),
            "read_pdf_content" => Ok(self.read_pdf_content(parse_args(name, args)?)),
            "get_pdf_resource_uri" => Ok(self.get_pdf_resource_uri(parse_args(name, args)?)),
            _ => Err(Error::UnknownTool {
                name: name.to_string(),
            }),
        }
    }

    /// Resolve, read and load a form document
    fn open_form(&self, pdf_path: &str, password: Option<&str>) -> Result<FormDocument> {
        let data = read_pdf(resolve_path(pdf_path))?;
        FormDocument::load(&data, password)
    }

    fn list_pdfs(&self, params: ListPdfsParams) -> Result<ToolOutput> {
        let directory = match params.directory.as_deref() {
            Some(dir) if !dir.is_empty() => resolve_path(dir),
            _ => self.config.default_pdf_dir.clone(),
        };
        let pattern = params
            .pattern
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| Error::InvalidArguments {
                tool: "list_pdfs".to_string(),
                reason: format!("invalid pattern: {}", e),
            })?;

        let files = collect_pdfs(&directory, params.recursive, pattern.as_ref())?;
        let listing: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();

        Ok(ToolOutput::text(format!(
            "Found {} PDF files:\n{}",
            files.len(),
            listing.join("\n")
        )))
    }

    fn read_pdf_fields(&self, params: ReadPdfFieldsParams) -> Result<ToolOutput> {
        let doc = self.open_form(&params.pdf_path, params.password.as_deref())?;
        let fields = doc.fields();
        Ok(ToolOutput::text(format!(
            "PDF has {} form fields:\n{}",
            fields.len(),
            serde_json::to_string_pretty(&fields)?
        )))
    }

    fn fill_pdf(&self, params: FillPdfParams) -> Result<ToolOutput> {
        let report = self.fill_and_save(
            &params.pdf_path,
            &params.output_path,
            &params.field_data,
            params.password.as_deref(),
        )?;

        let mut message = format!(
            "PDF filled successfully and saved to: {}\nFields filled: {}",
            params.output_path,
            report.filled.len()
        );
        append_errors(&mut message, &report);
        Ok(ToolOutput::text(message))
    }

    fn fill_and_save(
        &self,
        pdf_path: &str,
        output_path: &str,
        values: &FieldValueMap,
        password: Option<&str>,
    ) -> Result<FillReport> {
        let mut doc = self.open_form(pdf_path, password)?;
        let report = doc.fill(values);
        write_output(&resolve_path(output_path), &doc.save()?)?;
        tracing::debug!(
            filled = report.filled.len(),
            errors = report.errors.len(),
            output = output_path,
            "form saved"
        );
        Ok(report)
    }

    fn bulk_fill_from_csv(&self, params: BulkFillFromCsvParams) -> Result<ToolOutput> {
        let template = read_pdf(resolve_path(&params.pdf_path))?;
        let csv_text = std::fs::read_to_string(resolve_path(&params.csv_path))?;
        let records = tabular::decode(&csv_text)?;

        let output_dir = resolve_path(&params.output_directory);
        std::fs::create_dir_all(&output_dir)?;

        let mut lines = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let file_name = output_file_name(params.filename_column.as_deref(), record, index);
            let output = output_dir.join(&file_name);

            match fill_record(&template, record, params.password.as_deref(), &output) {
                Ok(report) if report.errors.is_empty() => lines.push(format!(
                    "✓ {}: {} fields filled",
                    file_name,
                    report.filled.len()
                )),
                Ok(report) => lines.push(format!(
                    "✓ {}: {} fields filled ({} field errors)",
                    file_name,
                    report.filled.len(),
                    report.errors.len()
                )),
                Err(e) => {
                    tracing::warn!(error = %e, record = index + 1, "bulk fill record failed");
                    lines.push(format!("✗ {}: {}", file_name, e));
                }
            }
        }

        Ok(ToolOutput::text(format!(
            "Bulk fill complete!\n{}",
            lines.join("\n")
        )))
    }

    fn save_profile(&self, params: SaveProfileParams) -> Result<ToolOutput> {
        self.profiles
            .save(&params.profile_name, &params.field_data)?;
        Ok(ToolOutput::text(format!(
            "Profile '{}' saved successfully!",
            params.profile_name
        )))
    }

    fn load_profile(&self, params: LoadProfileParams) -> Result<ToolOutput> {
        let raw = self.profiles.load_raw(&params.profile_name)?;
        Ok(ToolOutput::text(format!(
            "Profile '{}' loaded:\n{}",
            params.profile_name, raw
        )))
    }

    fn list_profiles(&self) -> Result<ToolOutput> {
        let names = self.profiles.list()?;
        if names.is_empty() {
            return Ok(ToolOutput::text("No profiles saved yet"));
        }
        Ok(ToolOutput::text(format!(
            "Available profiles:\n{}",
            names.join("\n")
        )))
    }

    fn fill_with_profile(&self, params: FillWithProfileParams) -> Result<ToolOutput> {
        let profile = self.profiles.load(&params.profile_name)?;
        let values = merge_profile(profile, params.additional_data);

        let report = self.fill_and_save(
            &params.pdf_path,
            &params.output_path,
            &values,
            params.password.as_deref(),
        )?;

        let mut message = format!(
            "PDF filled with profile '{}' and saved to: {}\nFields filled: {}",
            params.profile_name,
            params.output_path,
            report.filled.len()
        );
        append_errors(&mut message, &report);
        Ok(ToolOutput::text(message))
    }

    fn extract_to_csv(&self, params: ExtractToCsvParams) -> Result<ToolOutput> {
        let mut rows = Vec::with_capacity(params.pdf_paths.len());
        let mut field_names = BTreeSet::new();
        let mut failures = Vec::new();

        for pdf_path in &params.pdf_paths {
            let file_name = display_name(pdf_path);
            let mut row = CsvRecord::new();
            row.insert(FILENAME_COLUMN.to_string(), file_name.clone());

            match self.open_form(pdf_path, None) {
                Ok(doc) => {
                    for field in doc.fields() {
                        row.insert(field.name.clone(), field.export_value());
                        field_names.insert(field.name);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, pdf = %pdf_path, "extraction failed");
                    failures.push(format!("✗ {}: {}", file_name, e));
                }
            }
            rows.push(row);
        }

        let headers: Vec<String> = std::iter::once(FILENAME_COLUMN.to_string())
            .chain(field_names.iter().cloned())
            .collect();
        let csv = tabular::encode(&headers, &rows)?;
        write_output(&resolve_path(&params.output_csv), csv.as_bytes())?;

        let mut message = format!(
            "Extracted data from {} PDFs to: {}\nFields extracted: {}",
            params.pdf_paths.len(),
            params.output_csv,
            field_names.len()
        );
        if !failures.is_empty() {
            message.push_str("\nFailed documents:\n");
            message.push_str(&failures.join("\n"));
        }
        Ok(ToolOutput::text(message))
    }

    fn validate_pdf(&self, params: ValidatePdfParams) -> Result<ToolOutput> {
        let doc = self.open_form(&params.pdf_path, params.password.as_deref())?;
        let report = ValidationReport::from_fields(&doc.fields());
        Ok(ToolOutput::text(format_validation(
            &display_name(&params.pdf_path),
            &report,
        )))
    }

    fn read_pdf_content(&self, params: ReadPdfContentParams) -> ToolOutput {
        self.extract_content(&params.pdf_path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, pdf = %params.pdf_path, "read_pdf_content failed");
            ToolOutput::text(format!(
                "Error reading PDF file: {}\n\nPlease ensure the file path is correct and the file exists.",
                e
            ))
        })
    }

    fn extract_content(&self, pdf_path: &str) -> Result<ToolOutput> {
        let path = resolve_path(pdf_path);
        let data = read_pdf(&path)?;
        let file_name = display_name(&path);
        let size_kb = data.len() as f64 / 1024.0;

        let doc = FormDocument::load(&data, None)?;
        let page_count = doc.page_count();
        let text = doc.extract_text().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "text extraction failed, treating as scanned");
            String::new()
        });

        if !text.trim().is_empty() {
            let rule = "=".repeat(50);
            return Ok(ToolOutput::text(format!(
                "PDF Content Extracted Successfully!\n\n\
                 File: {}\nSize: {:.2} KB\nPages: {}\nText Length: {} characters\n\
                 \n{rule}\nEXTRACTED TEXT:\n{rule}\n\n{}",
                file_name,
                size_kb,
                page_count,
                text.chars().count(),
                text,
                rule = rule
            )));
        }

        let mut response = format!(
            "No text could be extracted from this PDF (likely a scanned document).\n\
             Converting page 1 to image for visual analysis...\n\n\
             File: {}\nSize: {:.2} KB\nPages: {}\n",
            file_name, size_kb, page_count
        );

        let scale = fallback_scale(size_kb);
        match self.render_first_page(&data, scale) {
            Ok(png) => {
                response.push_str(&format!(
                    "\nPage 1 extracted as image ({:.2} KB, scale: {:.2})\n",
                    png.len() as f64 / 1024.0,
                    scale
                ));
                Ok(ToolOutput {
                    content: vec![
                        ToolContent::Text(response),
                        ToolContent::Image {
                            data: base64::engine::general_purpose::STANDARD.encode(&png),
                            mime_type: PNG_MIME_TYPE.to_string(),
                        },
                    ],
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "page 1 fallback rendering failed");
                response.push_str(&format!(
                    "\n\nNote: No text could be extracted from this PDF, and image extraction also failed.\n\
                     Error: {}\n\
                     This might be because:\n\
                     - The PDF is encrypted or has restrictions\n\
                     - The PDF is corrupted\n\
                     - Page rendering (PDFium) is not installed on this system\n",
                    e
                ));
                Ok(ToolOutput::text(response))
            }
        }
    }

    fn render_first_page(&self, data: &[u8], scale: f32) -> Result<Vec<u8>> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| Error::CapabilityUnavailable {
                capability: "PDFium page rendering".to_string(),
            })?;
        renderer.render_page_png(data, 1, scale)
    }

    fn get_pdf_resource_uri(&self, params: GetPdfResourceUriParams) -> ToolOutput {
        let path = resolve_path(&params.pdf_path);
        let metadata = std::fs::metadata(&path).map_err(Error::Io).and_then(|m| {
            if m.is_file() {
                Ok(m)
            } else {
                Err(Error::PdfNotFound {
                    path: path.display().to_string(),
                })
            }
        });

        match metadata {
            Ok(metadata) => ToolOutput::text(format!(
                "Resource URI created: {}{}\n\nFile: {}\nSize: {:.2} KB\n\n\
                 The PDF can now be read through the Resources API using this URI.",
                PDF_URI_SCHEME,
                path.display(),
                display_name(&path),
                metadata.len() as f64 / 1024.0
            )),
            Err(e) => ToolOutput::text(format!(
                "Error accessing PDF file: {}\n\nPlease ensure the file path is correct and the file exists.",
                e
            )),
        }
    }

    /// PDFs in the default directory as `pdf://` resources
    pub fn list_pdf_resources(&self) -> Vec<Resource> {
        let files = match collect_pdfs(&self.config.default_pdf_dir, false, None) {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!(error = %e, "no PDF resources listed");
                return Vec::new();
            }
        };

        files
            .into_iter()
            .map(|path| {
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                let mut resource = RawResource::new(
                    format!("{}{}", PDF_URI_SCHEME, path.display()),
                    display_name(&path),
                );
                resource.mime_type = Some(PDF_MIME_TYPE.to_string());
                resource.description = Some(format!("PDF file ({} bytes)", size));
                resource.size = u32::try_from(size).ok();

                Annotated {
                    raw: resource,
                    annotations: None,
                }
            })
            .collect()
    }

    /// Read a `pdf://` resource as base64 blob contents
    pub fn read_pdf_resource(&self, uri: &str) -> Result<ResourceContents> {
        let path = uri
            .strip_prefix(PDF_URI_SCHEME)
            .ok_or_else(|| Error::UnsupportedUri {
                uri: uri.to_string(),
            })?;
        let data = std::fs::read(resolve_path(path))?;

        Ok(ResourceContents::BlobResourceContents {
            uri: uri.to_string(),
            mime_type: Some(PDF_MIME_TYPE.to_string()),
            blob: base64::engine::general_purpose::STANDARD.encode(&data),
            meta: Default::default(),
        })
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: JsonObject) -> Result<T> {
    serde_json::from_value(Value::Object(args)).map_err(|e| Error::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn append_errors(message: &mut String, report: &FillReport) {
    if report.errors.is_empty() {
        return;
    }
    let errors: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
    message.push_str("\nErrors:\n");
    message.push_str(&errors.join("\n"));
}

/// Output file name for CSV record `index` (0-based)
fn output_file_name(column: Option<&str>, record: &CsvRecord, index: usize) -> String {
    match column
        .and_then(|c| record.get(c))
        .filter(|v| !v.is_empty())
    {
        Some(value) => format!("{}.pdf", value.replace(['/', '\\'], "_")),
        None => format!("filled_{}.pdf", index + 1),
    }
}

fn fill_record(
    template: &[u8],
    record: &CsvRecord,
    password: Option<&str>,
    output: &Path,
) -> Result<FillReport> {
    let values: FieldValueMap = record
        .iter()
        .map(|(k, v)| (k.clone(), FieldValue::from(v.as_str())))
        .collect();

    let mut doc = FormDocument::load(template, password)?;
    let report = doc.fill(&values);
    write_output(output, &doc.save()?)?;
    Ok(report)
}

fn format_validation(file_name: &str, report: &ValidationReport) -> String {
    let mut message = format!(
        "PDF Validation Report for: {}\nTotal fields: {}\nFilled: {}\nEmpty: {}\n",
        file_name,
        report.total,
        report.filled,
        report.empty()
    );

    if !report.required_empty.is_empty() {
        message.push_str("\n⚠️  Required fields that are empty:\n");
        message.push_str(&report.required_empty.join("\n"));
    }

    let empty = &report.empty_fields;
    if !empty.is_empty() && empty.len() <= EMPTY_FIELDS_SHOWN {
        message.push_str("\n\nEmpty fields:\n");
        message.push_str(&empty.join("\n"));
    } else if empty.len() > EMPTY_FIELDS_SHOWN {
        message.push_str(&format!("\n\nFirst {} empty fields:\n", EMPTY_FIELDS_SHOWN));
        message.push_str(&empty[..EMPTY_FIELDS_SHOWN].join("\n"));
        message.push_str(&format!(
            "\n... and {} more",
            empty.len() - EMPTY_FIELDS_SHOWN
        ));
    }

    message
}

/// Write output data to a file path, creating parent directories.
fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, data)?;
    Ok(())
}

/// PDF files under `dir` (case-insensitive `.pdf`), sorted by path
fn collect_pdfs(
    dir: &Path,
    recursive: bool,
    pattern: Option<&glob::Pattern>,
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let mut files = Vec::new();
    collect_pdfs_into(dir, recursive, pattern, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_pdfs_into(
    dir: &Path,
    recursive: bool,
    pattern: Option<&glob::Pattern>,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();

        if path.is_dir() {
            if recursive {
                if let Err(e) = collect_pdfs_into(&path, recursive, pattern, files) {
                    tracing::debug!(error = %e, dir = %path.display(), "skipping directory");
                }
            }
            continue;
        }

        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }

        if let Some(pat) = pattern {
            let name = display_name(&path);
            if !pat.matches(&name) {
                continue;
            }
        }

        files.push(path);
    }

    Ok(())
}

impl ServerHandler for PdfFillerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Filler MCP Server reads, fills, validates and exports PDF forms, \
                 with CSV bulk filling and reusable field profiles. \
                 PDFs are also readable as pdf:// resources."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let args = request.arguments.unwrap_or_default();
        Ok(self.dispatch(&request.name, args).await.into())
    }

    /// List PDFs in the default directory
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListResourcesResult, ErrorData> {
        let server = self.clone();
        let resources = tokio::task::spawn_blocking(move || server.list_pdf_resources())
            .await
            .unwrap_or_default();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Read a PDF resource as a base64 blob
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ReadResourceResult, ErrorData> {
        match self.read_pdf_resource(&request.uri) {
            Ok(contents) => Ok(ReadResourceResult {
                contents: vec![contents],
            }),
            Err(e @ Error::UnsupportedUri { .. }) => {
                Err(ErrorData::invalid_params(e.to_string(), None))
            }
            Err(e) => {
                tracing::warn!(error = %e, uri = %request.uri, "read_resource failed");
                Err(ErrorData::internal_error(
                    format!("Failed to read PDF: {}", e),
                    None,
                ))
            }
        }
    }
}

/// Run the MCP server with configuration taken from the environment
pub async fn run_server() -> anyhow::Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

/// Run the MCP server with explicit configuration
pub async fn run_server_with_config(config: ServerConfig) -> anyhow::Result<()> {
    ProfileStore::new(config.profile_dir.clone())
        .ensure_dir()
        .map_err(|e| {
            anyhow::anyhow!(
                "cannot create profile directory {}: {}",
                config.profile_dir.display(),
                e
            )
        })?;

    tracing::info!(
        pdf_dir = %config.default_pdf_dir.display(),
        profile_dir = %config.profile_dir.display(),
        "configuration loaded"
    );

    let server = PdfFillerServer::new(config);

    tracing::info!("PDF Filler MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
