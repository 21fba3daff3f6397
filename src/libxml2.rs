//! LibXML2 FFI Wrapper Module
//!
//! XML Schema (XSD) validation of in-memory documents through direct libxml2
//! FFI. No mature pure Rust XSD validator exists, so the schema validator is the
//! one variant that leaves the quick-xml based checks in [`crate::markup`].
//!
//! ## Thread Safety
//!
//! - libxml2 initialization is not thread-safe and runs exactly once behind a
//!   [`Once`].
//! - Schema parsing is not thread-safe either. A [`SchemaValidator`] parses its
//!   schema once, when it is built.
//! - Validation of different documents is thread-safe; every call creates its
//!   own document and validation context, and shares the parsed schema
//!   read-only.

use std::ffi::CStr;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Once};

use libc::{c_char, c_int, c_void};
use tracing::debug;

use crate::error::{LibXml2Error, LibXml2Result, Result};
use crate::validator::{DocumentValidator, ErrorType, ValidationError};

static LIBXML2_INIT: Once = Once::new();

/// Keep the parser quiet and offline; findings are collected, not printed
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;

/// `xmlErrorLevel`
const XML_ERR_WARNING: c_int = 1;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    /// column, when known
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const xmlError)>;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    fn xmlInitParser();

    fn xmlSchemaNewMemParserCtxt(buffer: *const c_char, size: c_int) -> *mut XmlSchemaParserCtxt;
    fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    fn xmlSchemaFree(schema: *mut XmlSchema);

    fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    fn xmlFreeDoc(doc: *mut XmlDoc);

    fn xmlGetLastError() -> *const xmlError;
    fn xmlResetLastError();
}

/// Convert a libxml2 error record into a finding
///
/// # Safety
///
/// `error` must be null or point to a valid `xmlError`.
unsafe fn to_validation_error(error: *const xmlError) -> Option<ValidationError> {
    if error.is_null() {
        return None;
    }
    let error = unsafe { &*error };

    let message = if error.message.is_null() {
        "unknown libxml2 error".to_string()
    } else {
        unsafe { CStr::from_ptr(error.message) }
            .to_string_lossy()
            .trim()
            .to_string()
    };
    let error_type = if error.level == XML_ERR_WARNING {
        ErrorType::Warning
    } else {
        ErrorType::Error
    };
    // libxml2 uses 0 for "no line"
    let line = if error.line > 0 { error.line } else { -1 };

    Some(ValidationError::from_raw(error_type, line, error.int2, message))
}

unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *const xmlError) {
    if user_data.is_null() {
        return;
    }
    let findings = unsafe { &mut *(user_data as *mut Vec<ValidationError>) };
    if let Some(finding) = unsafe { to_validation_error(error) } {
        findings.push(finding);
    }
}

/// Parsed schema, freed when the last clone is dropped
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: parsed xmlSchema structures are read-only during validation
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Frees a parsed document on every exit path
struct DocGuard(*mut XmlDoc);

impl Drop for DocGuard {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.0) }
    }
}

/// Frees a validation context on every exit path
struct ValidCtxtGuard(*mut XmlSchemaValidCtxt);

impl Drop for ValidCtxtGuard {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeValidCtxt(self.0) }
    }
}

/// Safe access to the libxml2 calls the schema validator needs
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 on first use; cheap afterwards
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse an XSD from memory. Must not run concurrently with other parses.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;

        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            XmlSchemaPtr::from_raw(schema_ptr)
        }
    }

    /// Parse `document` and validate it against `schema`.
    ///
    /// A document that is not well-formed yields the parser's error as the only
    /// finding. `Err` is reserved for libxml2 failing internally.
    pub fn validate_document(
        &self,
        schema: &XmlSchemaPtr,
        document: &[u8],
    ) -> LibXml2Result<Vec<ValidationError>> {
        let size = c_int::try_from(document.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;
        let options = XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET;

        unsafe {
            xmlResetLastError();
            let doc = xmlReadMemory(
                document.as_ptr() as *const c_char,
                size,
                std::ptr::null(),
                std::ptr::null(),
                options,
            );
            if doc.is_null() {
                let finding = to_validation_error(xmlGetLastError())
                    .unwrap_or_else(|| ValidationError::error("Document is not well-formed XML"));
                return Ok(vec![finding]);
            }
            let doc = DocGuard(doc);

            let ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }
            let ctxt = ValidCtxtGuard(ctxt);

            let mut findings: Vec<ValidationError> = Vec::new();
            xmlSchemaSetValidStructuredErrors(
                ctxt.0,
                Some(structured_error_callback),
                &mut findings as *mut Vec<ValidationError> as *mut c_void,
            );

            let code = xmlSchemaValidateDoc(ctxt.0, doc.0);
            drop(ctxt);

            if code < 0 && findings.is_empty() {
                findings.push(ValidationError::error(format!(
                    "libxml2 internal validation error (code {})",
                    code
                )));
            }
            Ok(findings)
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates documents against one XML Schema
pub struct SchemaValidator {
    wrapper: LibXml2Wrapper,
    schema: XmlSchemaPtr,
}

impl SchemaValidator {
    pub fn from_bytes(xsd: &[u8]) -> LibXml2Result<Self> {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(xsd)?;
        Ok(Self { wrapper, schema })
    }

    /// Read and parse an XSD file
    pub async fn load(path: &Path) -> Result<Self> {
        let xsd = tokio::fs::read(path).await?;
        let validator = Self::from_bytes(&xsd)?;
        debug!(schema = %path.display(), "schema parsed");
        Ok(validator)
    }
}

impl DocumentValidator for SchemaValidator {
    fn name(&self) -> &str {
        "XSD"
    }

    fn validate(&self, document: &[u8]) -> Vec<ValidationError> {
        match self.wrapper.validate_document(&self.schema, document) {
            Ok(findings) => findings,
            Err(e) => vec![ValidationError::error(e.to_string())],
        }
    }
}
