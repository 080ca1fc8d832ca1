//! PDF Filler MCP Server Library
//!
//! This crate provides MCP tools for PDF form filling:
//! - `read_pdf_fields` / `validate_pdf`: Inspect AcroForm fields
//! - `fill_pdf` / `fill_with_profile`: Fill forms from values or saved profiles
//! - `bulk_fill_from_csv` / `extract_to_csv`: Batch fill and export via CSV
//! - `read_pdf_content`: Extract text, with a page image for scanned PDFs

pub mod error;
pub mod pdf;
pub mod profile;
pub mod server;
pub mod source;
pub mod tabular;

pub use error::{Error, Result};
pub use pdf::{FieldKind, FieldValue, FieldValueMap, FormDocument, PageRenderer};
pub use profile::ProfileStore;
pub use server::{
    run_server, run_server_with_config, PdfFillerServer, ServerConfig, ToolContent, ToolOutput,
};
