// LDAP result codes (RFC 4511 appendix A) plus client-local codes, and the
// translator from an LDAPResult element to an outcome.

use crate::ber::{Class, Packet};
use crate::error::{LdapError, Result};
use std::fmt;

/// Context tag of the referral field inside LDAPResult.
const REFERRAL_TAG: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultCode(pub u16);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const OPERATIONS_ERROR: ResultCode = ResultCode(1);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const TIME_LIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZE_LIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const COMPARE_FALSE: ResultCode = ResultCode(5);
    pub const COMPARE_TRUE: ResultCode = ResultCode(6);
    pub const AUTH_METHOD_NOT_SUPPORTED: ResultCode = ResultCode(7);
    pub const STRONG_AUTH_REQUIRED: ResultCode = ResultCode(8);
    pub const REFERRAL: ResultCode = ResultCode(10);
    pub const ADMIN_LIMIT_EXCEEDED: ResultCode = ResultCode(11);
    pub const UNAVAILABLE_CRITICAL_EXTENSION: ResultCode = ResultCode(12);
    pub const CONFIDENTIALITY_REQUIRED: ResultCode = ResultCode(13);
    pub const SASL_BIND_IN_PROGRESS: ResultCode = ResultCode(14);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const UNDEFINED_ATTRIBUTE_TYPE: ResultCode = ResultCode(17);
    pub const INAPPROPRIATE_MATCHING: ResultCode = ResultCode(18);
    pub const CONSTRAINT_VIOLATION: ResultCode = ResultCode(19);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: ResultCode = ResultCode(20);
    pub const INVALID_ATTRIBUTE_SYNTAX: ResultCode = ResultCode(21);
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const ALIAS_PROBLEM: ResultCode = ResultCode(33);
    pub const INVALID_DN_SYNTAX: ResultCode = ResultCode(34);
    pub const ALIAS_DEREFERENCING_PROBLEM: ResultCode = ResultCode(36);
    pub const INAPPROPRIATE_AUTHENTICATION: ResultCode = ResultCode(48);
    pub const INVALID_CREDENTIALS: ResultCode = ResultCode(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: ResultCode = ResultCode(50);
    pub const BUSY: ResultCode = ResultCode(51);
    pub const UNAVAILABLE: ResultCode = ResultCode(52);
    pub const UNWILLING_TO_PERFORM: ResultCode = ResultCode(53);
    pub const LOOP_DETECT: ResultCode = ResultCode(54);
    pub const NAMING_VIOLATION: ResultCode = ResultCode(64);
    pub const OBJECT_CLASS_VIOLATION: ResultCode = ResultCode(65);
    pub const NOT_ALLOWED_ON_NON_LEAF: ResultCode = ResultCode(66);
    pub const NOT_ALLOWED_ON_RDN: ResultCode = ResultCode(67);
    pub const ENTRY_ALREADY_EXISTS: ResultCode = ResultCode(68);
    pub const OBJECT_CLASS_MODS_PROHIBITED: ResultCode = ResultCode(69);
    pub const AFFECTS_MULTIPLE_DSAS: ResultCode = ResultCode(71);
    pub const OTHER: ResultCode = ResultCode(80);

    // Client-local codes, never sent by a server.
    pub const ERROR_NETWORK: ResultCode = ResultCode(201);
    pub const ERROR_FILTER_COMPILE: ResultCode = ResultCode(202);
    pub const ERROR_FILTER_DECOMPILE: ResultCode = ResultCode(203);
    pub const ERROR_DEBUGGING: ResultCode = ResultCode(204);
    pub const ERROR_ENCODING: ResultCode = ResultCode(205);
    pub const ERROR_DECODING: ResultCode = ResultCode(206);
    pub const ERROR_MISSING_CONTROL: ResultCode = ResultCode(207);
    pub const ERROR_INVALID_ARGUMENT: ResultCode = ResultCode(208);
    pub const ERROR_LDIF_READ: ResultCode = ResultCode(209);
    pub const ERROR_LDIF_WRITE: ResultCode = ResultCode(210);
    pub const ERROR_CLOSING: ResultCode = ResultCode(211);
    pub const ERROR_UNKNOWN: ResultCode = ResultCode(212);

    pub fn from_wire(value: i64) -> Result<Self> {
        u16::try_from(value)
            .map(ResultCode)
            .map_err(|_| LdapError::Decoding(format!("result code {} out of range", value)))
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn is_client_local(self) -> bool {
        (201..=212).contains(&self.0)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "Success",
            1 => "Operations Error",
            2 => "Protocol Error",
            3 => "Time Limit Exceeded",
            4 => "Size Limit Exceeded",
            5 => "Compare False",
            6 => "Compare True",
            7 => "Auth Method Not Supported",
            8 => "Strong Auth Required",
            10 => "Referral",
            11 => "Admin Limit Exceeded",
            12 => "Unavailable Critical Extension",
            13 => "Confidentiality Required",
            14 => "Sasl Bind In Progress",
            16 => "No Such Attribute",
            17 => "Undefined Attribute Type",
            18 => "Inappropriate Matching",
            19 => "Constraint Violation",
            20 => "Attribute Or Value Exists",
            21 => "Invalid Attribute Syntax",
            32 => "No Such Object",
            33 => "Alias Problem",
            34 => "Invalid DN Syntax",
            36 => "Alias Dereferencing Problem",
            48 => "Inappropriate Authentication",
            49 => "Invalid Credentials",
            50 => "Insufficient Access Rights",
            51 => "Busy",
            52 => "Unavailable",
            53 => "Unwilling To Perform",
            54 => "Loop Detect",
            64 => "Naming Violation",
            65 => "Object Class Violation",
            66 => "Not Allowed On Non Leaf",
            67 => "Not Allowed On RDN",
            68 => "Entry Already Exists",
            69 => "Object Class Mods Prohibited",
            71 => "Affects Multiple DSAs",
            80 => "Other",
            201 => "Network Error",
            202 => "Filter Compile Error",
            203 => "Filter Decompile Error",
            204 => "Debugging Error",
            205 => "Encoding Error",
            206 => "Decoding Error",
            207 => "Missing Control",
            208 => "Invalid Argument",
            209 => "LDIF Read Error",
            210 => "LDIF Write Error",
            211 => "Closing",
            212 => "Unknown Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Decoded LDAPResult components of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
    pub referrals: Vec<String>,
}

impl LdapResult {
    /// Success passes through; everything else becomes an error.
    pub fn check(self) -> Result<LdapResult> {
        if self.code.is_success() {
            return Ok(self);
        }
        Err(self.into_error())
    }

    pub fn into_error(self) -> LdapError {
        if self.code == ResultCode::REFERRAL && !self.referrals.is_empty() {
            let message = self.referrals[0].clone();
            return LdapError::Referral {
                urls: self.referrals,
                message,
            };
        }
        LdapError::Protocol {
            code: self.code,
            matched_dn: self.matched_dn,
            message: self.message,
        }
    }
}

/// Decode the LDAPResult fields of a response protocol op:
/// `resultCode ENUMERATED, matchedDN LDAPDN, diagnosticMessage LDAPString,
/// referral [3] Referral OPTIONAL`, possibly followed by op-specific fields.
pub fn decode_ldap_result(op: &Packet) -> Result<LdapResult> {
    if op.class() != Class::Application || !op.is_constructed() {
        return Err(LdapError::Decoding("invalid packet format".to_string()));
    }
    if op.children().len() < 3 {
        return Err(LdapError::Decoding(format!(
            "LDAPResult needs 3 components, found {}",
            op.children().len()
        )));
    }
    let code = ResultCode::from_wire(op.child(0)?.as_i64()?)?;
    let matched_dn = op.child(1)?.to_string_lossy();
    let message = op.child(2)?.to_string_lossy();
    let referrals = match op.children().get(3) {
        Some(field) if field.is(Class::Context, REFERRAL_TAG) && field.is_constructed() => {
            field.children().iter().map(|uri| uri.to_string_lossy()).collect()
        }
        _ => Vec::new(),
    };
    Ok(LdapResult {
        code,
        matched_dn,
        message,
        referrals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(code: i64, matched: &str, message: &str) -> Packet {
        Packet::constructed(Class::Application, 1)
            .with_child(Packet::enumerated(code))
            .with_child(Packet::octet_string(matched))
            .with_child(Packet::octet_string(message))
    }

    #[test]
    fn test_success_passes_through() {
        let result = decode_ldap_result(&response(0, "", "")).unwrap();
        assert!(result.code.is_success());
        assert!(result.check().is_ok());
    }

    #[test]
    fn test_failure_carries_code_and_message() {
        let err = decode_ldap_result(&response(49, "", "bad password"))
            .unwrap()
            .check()
            .unwrap_err();
        match err {
            LdapError::Protocol { code, message, .. } => {
                assert_eq!(code, ResultCode::INVALID_CREDENTIALS);
                assert_eq!(message, "bad password");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_referral_exposes_urls() {
        let op = response(10, "", "go elsewhere").with_child(
            Packet::constructed(Class::Context, 3)
                .with_child(Packet::octet_string("ldap://a.example.com/"))
                .with_child(Packet::octet_string("ldap://b.example.com/")),
        );
        let err = decode_ldap_result(&op).unwrap().check().unwrap_err();
        match err {
            LdapError::Referral { urls, message } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(message, "ldap://a.example.com/");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_referral_without_urls_is_protocol_error() {
        let err = decode_ldap_result(&response(10, "", "")).unwrap().check().unwrap_err();
        assert_eq!(err.result_code(), ResultCode::REFERRAL);
    }

    #[test]
    fn test_short_result_is_decoding_error() {
        let op = Packet::constructed(Class::Application, 1).with_child(Packet::enumerated(0));
        assert!(matches!(decode_ldap_result(&op), Err(LdapError::Decoding(_))));
        let not_app = Packet::sequence();
        assert!(decode_ldap_result(&not_app).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(ResultCode::NO_SUCH_OBJECT.name(), "No Such Object");
        assert_eq!(ResultCode::ERROR_CLOSING.to_string(), "211 (Closing)");
        assert!(ResultCode::ERROR_NETWORK.is_client_local());
        assert!(!ResultCode::OTHER.is_client_local());
        assert!(ResultCode::from_wire(-1).is_err());
    }
}
