pub mod client;
pub mod size;

pub use client::{KnowledgeClient, Relayed, UploadedFile};

/// Reasons an upload never made it far enough to be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    NoFile,
    TooLarge,
    Partial,
}

impl UploadFailure {
    pub fn message(self, max_upload_size: u64) -> String {
        match self {
            UploadFailure::NoFile => "No file was uploaded".to_string(),
            UploadFailure::TooLarge => format!(
                "File exceeds server limit ({})",
                size::format_size(max_upload_size)
            ),
            UploadFailure::Partial => "File was only partially uploaded".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_failure_messages() {
        assert_eq!(UploadFailure::NoFile.message(0), "No file was uploaded");
        assert_eq!(
            UploadFailure::TooLarge.message(2 * 1024 * 1024),
            "File exceeds server limit (2MB)"
        );
    }
}
