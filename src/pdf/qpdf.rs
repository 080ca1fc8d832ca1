//! qpdf FFI wrapper for password-protected documents
//!
//! Form editing happens on plain documents only; encrypted input is
//! decrypted here first and handed on as unencrypted bytes.

use crate::error::{classify_load_error, Error, Result};
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};

/// Wrapper for qpdf operations via FFI
pub struct QpdfWrapper;

/// Map qpdf crate errors to our error types
fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::PasswordRequired,
        _ => classify_load_error(&e.to_string()),
    }
}

impl QpdfWrapper {
    /// Decrypt a PDF (remove password protection)
    ///
    /// # Arguments
    /// * `input_data` - Raw PDF bytes
    /// * `password` - Password for the encrypted PDF
    ///
    /// # Returns
    /// The decrypted PDF as bytes. Unencrypted input is rewritten unchanged.
    pub fn decrypt(input_data: &[u8], password: &str) -> Result<Vec<u8>> {
        let qpdf =
            QPdf::read_from_memory_encrypted(input_data, password).map_err(map_qpdf_error)?;

        let mut writer = qpdf.writer();
        writer.preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    /// Protect a PDF with a user password (AES-256, all permissions granted)
    ///
    /// The owner password equals the user password.
    pub fn encrypt(input_data: &[u8], password: &str) -> Result<Vec<u8>> {
        let qpdf = QPdf::read_from_memory(input_data).map_err(map_qpdf_error)?;

        let encryption = EncryptionParams::R6(EncryptionParamsR6 {
            user_password: password.to_string(),
            owner_password: password.to_string(),
            allow_accessibility: true,
            allow_extract: true,
            allow_assemble: true,
            allow_annotate_and_form: true,
            allow_form_filling: true,
            allow_modify_other: true,
            allow_print: PrintPermission::Full,
            encrypt_metadata: true,
        });

        let mut writer = qpdf.writer();
        writer
            .preserve_encryption(false)
            .encryption_params(encryption);
        writer.write_to_memory().map_err(map_qpdf_error)
    }
}
