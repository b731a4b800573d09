/// A container image opened in a local runtime.
///
/// The handle is plain data; the runtime that produced it keeps ownership of
/// the underlying artifact until the acquisition workflow removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageHandle {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub repo_refs: Vec<String>,
}

impl ImageHandle {
    pub fn new(id: impl Into<String>, repo_refs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            repo_refs,
        }
    }

    /// First human readable reference, falling back to the image id.
    pub fn display_ref(&self) -> &str {
        self.repo_refs
            .first()
            .map(String::as_str)
            .unwrap_or(self.id.as_str())
    }
}
