use crate::result_code::ResultCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LdapError>;

#[derive(Error, Debug)]
pub enum LdapError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out waiting for response to message {message_id}")]
    Timeout { message_id: i64 },

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("filter compile error: {0}")]
    FilterCompile(String),

    #[error("filter decompile error: {0}")]
    FilterDecompile(String),

    #[error("missing control: {0}")]
    MissingControl(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection closing: {0}")]
    Closing(String),

    #[error("LDAP result code {code}: {message}")]
    Protocol {
        code: ResultCode,
        matched_dn: String,
        message: String,
    },

    #[error("referral to {message}")]
    Referral { urls: Vec<String>, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LdapError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            LdapError::Network(_) | LdapError::Timeout { .. } | LdapError::Io(_) => {
                ResultCode::ERROR_NETWORK
            }
            LdapError::Tls(_) => ResultCode::ERROR_NETWORK,
            LdapError::Decoding(_) => ResultCode::ERROR_DECODING,
            LdapError::Encoding(_) => ResultCode::ERROR_ENCODING,
            LdapError::FilterCompile(_) => ResultCode::ERROR_FILTER_COMPILE,
            LdapError::FilterDecompile(_) => ResultCode::ERROR_FILTER_DECOMPILE,
            LdapError::MissingControl(_) => ResultCode::ERROR_MISSING_CONTROL,
            LdapError::InvalidArgument(_) => ResultCode::ERROR_INVALID_ARGUMENT,
            LdapError::Closing(_) => ResultCode::ERROR_CLOSING,
            LdapError::Protocol { code, .. } => *code,
            LdapError::Referral { .. } => ResultCode::REFERRAL,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LdapError::Timeout { .. })
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, LdapError::Closing(_))
    }

    pub(crate) fn closing() -> Self {
        LdapError::Closing("connection is closed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(
            LdapError::Timeout { message_id: 3 }.result_code(),
            ResultCode::ERROR_NETWORK
        );
        assert_eq!(LdapError::closing().result_code(), ResultCode::ERROR_CLOSING);
        let err = LdapError::Protocol {
            code: ResultCode::NO_SUCH_OBJECT,
            matched_dn: "dc=example,dc=com".to_string(),
            message: "entry not found".to_string(),
        };
        assert_eq!(err.result_code(), ResultCode::NO_SUCH_OBJECT);
        assert_eq!(
            err.to_string(),
            "LDAP result code 32 (No Such Object): entry not found"
        );
    }
}
