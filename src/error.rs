pub type NotefallResult<T> = Result<T, NotefallError>;

#[derive(thiserror::Error, Debug)]
pub enum NotefallError {
    #[error("media read error: {0}")]
    MediaRead(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NotefallError {
    pub fn media_read(msg: impl Into<String>) -> Self {
        Self::MediaRead(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            NotefallError::media_read("x")
                .to_string()
                .contains("media read error:")
        );
        assert!(
            NotefallError::format("x")
                .to_string()
                .contains("format error:")
        );
        assert!(
            NotefallError::config("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(
            NotefallError::encode("x")
                .to_string()
                .contains("encode error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = NotefallError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
