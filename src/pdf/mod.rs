//! PDF processing layer
//!
//! Form editing and text extraction use lopdf; qpdf decrypts protected
//! input and PDFium rasterizes pages when no text layer exists.

mod form;
mod qpdf;
mod render;

pub use form::{
    looks_required, CurrentValue, FieldError, FieldFlags, FieldKind, FieldValue, FieldValueMap,
    FillReport, FormDocument, FormField, FormFieldInfo, ValidationReport,
};
pub use qpdf::QpdfWrapper;
pub use render::{fallback_scale, PageRenderer, PdfiumRenderer, MAX_RENDER_SCALE};

#[cfg(test)]
pub(crate) use form::tests::FormBuilder;
