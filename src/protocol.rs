// LDAPMessage envelope and protocol op tags (RFC 4511 section 4.2).

use crate::ber::{Class, Packet};
use crate::control::{self, Control, CONTROLS_TAG};
use crate::error::{LdapError, Result};

pub const LDAP_VERSION: i64 = 3;

pub const APP_BIND_REQUEST: u8 = 0;
pub const APP_BIND_RESPONSE: u8 = 1;
pub const APP_UNBIND_REQUEST: u8 = 2;
pub const APP_SEARCH_REQUEST: u8 = 3;
pub const APP_SEARCH_RESULT_ENTRY: u8 = 4;
pub const APP_SEARCH_RESULT_DONE: u8 = 5;
pub const APP_MODIFY_REQUEST: u8 = 6;
pub const APP_MODIFY_RESPONSE: u8 = 7;
pub const APP_ADD_REQUEST: u8 = 8;
pub const APP_ADD_RESPONSE: u8 = 9;
pub const APP_DEL_REQUEST: u8 = 10;
pub const APP_DEL_RESPONSE: u8 = 11;
pub const APP_MODIFY_DN_REQUEST: u8 = 12;
pub const APP_MODIFY_DN_RESPONSE: u8 = 13;
pub const APP_COMPARE_REQUEST: u8 = 14;
pub const APP_COMPARE_RESPONSE: u8 = 15;
pub const APP_ABANDON_REQUEST: u8 = 16;
pub const APP_SEARCH_RESULT_REFERENCE: u8 = 19;
pub const APP_EXTENDED_REQUEST: u8 = 23;
pub const APP_EXTENDED_RESPONSE: u8 = 24;
pub const APP_INTERMEDIATE_RESPONSE: u8 = 25;

pub const START_TLS_OID: &str = "1.3.6.1.4.1.1466.20037";
pub const WHO_AM_I_OID: &str = "1.3.6.1.4.1.4203.1.11.3";
pub const PASSWORD_MODIFY_OID: &str = "1.3.6.1.4.1.4203.1.11.1";

/// Message id of unsolicited notifications (RFC 4511 section 4.4).
pub const UNSOLICITED_MESSAGE_ID: i64 = 0;

/// `LDAPMessage ::= SEQUENCE { messageID, protocolOp, controls [0] OPTIONAL }`
pub fn build_envelope(message_id: i64, op: Packet, controls: &[Control]) -> Result<Packet> {
    let mut envelope = Packet::sequence()
        .with_child(Packet::integer(message_id))
        .with_child(op);
    if !controls.is_empty() {
        envelope.append_child(control::encode_controls(controls)?);
    }
    Ok(envelope)
}

pub fn message_id(envelope: &Packet) -> Result<i64> {
    if envelope.children().len() < 2 {
        return Err(LdapError::Decoding(format!(
            "LDAPMessage needs at least 2 components, found {}",
            envelope.children().len()
        )));
    }
    envelope.child(0)?.as_i64()
}

pub fn protocol_op(envelope: &Packet) -> Result<&Packet> {
    let op = envelope.child(1)?;
    if op.class() != Class::Application {
        return Err(LdapError::Decoding(format!(
            "protocol op must be application class, got {:?}",
            op.class()
        )));
    }
    Ok(op)
}

/// Controls attached to a response; empty when the field is absent.
pub fn response_controls(envelope: &Packet) -> Result<Vec<Control>> {
    match envelope.children().get(2) {
        Some(field) if field.is(Class::Context, CONTROLS_TAG) => control::decode_controls(field),
        _ => Ok(Vec::new()),
    }
}

/// Take the protocol op out of a response, checking its tag.
pub fn expect_response(envelope: Packet, expected: u8) -> Result<Packet> {
    protocol_op(&envelope)?;
    let op = envelope
        .into_children()
        .into_iter()
        .nth(1)
        .ok_or_else(|| LdapError::Decoding("missing protocol op".to_string()))?;
    if op.tag() != expected {
        return Err(LdapError::Decoding(format!(
            "expected {}, got {}",
            application_name(expected),
            application_name(op.tag())
        )));
    }
    Ok(op)
}

pub fn application_name(tag: u8) -> &'static str {
    match tag {
        APP_BIND_REQUEST => "Bind Request",
        APP_BIND_RESPONSE => "Bind Response",
        APP_UNBIND_REQUEST => "Unbind Request",
        APP_SEARCH_REQUEST => "Search Request",
        APP_SEARCH_RESULT_ENTRY => "Search Result Entry",
        APP_SEARCH_RESULT_DONE => "Search Result Done",
        APP_MODIFY_REQUEST => "Modify Request",
        APP_MODIFY_RESPONSE => "Modify Response",
        APP_ADD_REQUEST => "Add Request",
        APP_ADD_RESPONSE => "Add Response",
        APP_DEL_REQUEST => "Del Request",
        APP_DEL_RESPONSE => "Del Response",
        APP_MODIFY_DN_REQUEST => "Modify DN Request",
        APP_MODIFY_DN_RESPONSE => "Modify DN Response",
        APP_COMPARE_REQUEST => "Compare Request",
        APP_COMPARE_RESPONSE => "Compare Response",
        APP_ABANDON_REQUEST => "Abandon Request",
        APP_SEARCH_RESULT_REFERENCE => "Search Result Reference",
        APP_EXTENDED_REQUEST => "Extended Request",
        APP_EXTENDED_RESPONSE => "Extended Response",
        APP_INTERMEDIATE_RESPONSE => "Intermediate Response",
        _ => "Unknown",
    }
}

/// Metric label for a request op.
pub fn metric_op_name(tag: u8) -> &'static str {
    match tag {
        APP_BIND_REQUEST => "bind",
        APP_UNBIND_REQUEST => "unbind",
        APP_SEARCH_REQUEST => "search",
        APP_MODIFY_REQUEST => "modify",
        APP_ADD_REQUEST => "add",
        APP_DEL_REQUEST => "delete",
        APP_MODIFY_DN_REQUEST => "modify_dn",
        APP_COMPARE_REQUEST => "compare",
        APP_ABANDON_REQUEST => "abandon",
        APP_EXTENDED_REQUEST => "extended",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber;

    #[test]
    fn test_envelope_layout() {
        let op = Packet::tagged_bytes(Class::Application, APP_DEL_REQUEST, b"cn=x".to_vec());
        let envelope = build_envelope(7, op, &[]).unwrap();
        let bytes = envelope.to_bytes();
        // SEQUENCE { INTEGER 7, [APPLICATION 10] "cn=x" }
        assert_eq!(bytes, vec![0x30, 0x09, 0x02, 0x01, 0x07, 0x4A, 0x04, b'c', b'n', b'=', b'x']);
        let decoded = ber::decode(&bytes).unwrap();
        assert_eq!(message_id(&decoded).unwrap(), 7);
        assert_eq!(protocol_op(&decoded).unwrap().tag(), APP_DEL_REQUEST);
        assert!(response_controls(&decoded).unwrap().is_empty());
    }

    #[test]
    fn test_envelope_with_controls() {
        let op = Packet::tagged_bytes(Class::Application, APP_DEL_REQUEST, b"cn=x".to_vec());
        let envelope =
            build_envelope(2, op, &[Control::SubtreeDelete { criticality: true }]).unwrap();
        let decoded = ber::decode(&envelope.to_bytes()).unwrap();
        let controls = response_controls(&decoded).unwrap();
        assert_eq!(controls, vec![Control::SubtreeDelete { criticality: true }]);
    }

    #[test]
    fn test_expect_response_checks_tag() {
        let op = Packet::constructed(Class::Application, APP_BIND_RESPONSE);
        let envelope = build_envelope(1, op, &[]).unwrap();
        assert!(expect_response(envelope.clone(), APP_BIND_RESPONSE).is_ok());
        assert!(matches!(
            expect_response(envelope, APP_DEL_RESPONSE),
            Err(LdapError::Decoding(_))
        ));
    }

    #[test]
    fn test_message_id_requires_op() {
        let envelope = Packet::sequence().with_child(Packet::integer(1));
        assert!(message_id(&envelope).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(application_name(APP_SEARCH_RESULT_DONE), "Search Result Done");
        assert_eq!(metric_op_name(APP_MODIFY_DN_REQUEST), "modify_dn");
        assert_eq!(metric_op_name(200), "unknown");
    }
}
