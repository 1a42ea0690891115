//! Multipart classification errors.

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("request body already consumed")]
    AlreadyConsumed,
    #[error("missing or invalid multipart boundary")]
    MissingBoundary,
    #[error("fields must precede file")]
    FieldsMustPrecedeFile,
    #[error("multipart body contains no file")]
    NoFile,
    #[error("unsupported file type")]
    UnsupportedFileType,
    #[error("file too small or unsupported type")]
    TooSmallOrUnsupported,
    #[error("file declared as text is not valid UTF-8")]
    InvalidText,
    #[error("multipart decoding failed: {0}")]
    Decoder(#[from] multer::Error),
}

impl MultipartError {
    /// Rejections of the file itself, as opposed to framing or protocol errors.
    pub fn is_file_rejection(&self) -> bool {
        matches!(
            self,
            MultipartError::UnsupportedFileType
                | MultipartError::TooSmallOrUnsupported
                | MultipartError::InvalidText
        )
    }
}
