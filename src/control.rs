// LDAP controls: typed variants for the well-known OIDs, an OID-keyed
// decoder table, and a generic fallback for everything else.

use crate::ber::{Class, Packet, TAG_BOOLEAN, TAG_OCTET_STRING};
use crate::error::{LdapError, Result};
use crate::filter;
use crate::result_code::ResultCode;
use std::fmt;

pub const CONTROL_TYPE_MATCHED_VALUES: &str = "1.2.826.0.1.3344810.2.3";
pub const CONTROL_TYPE_PERMISSIVE_MODIFY: &str = "1.2.840.113556.1.4.1413";
pub const CONTROL_TYPE_PAGING: &str = "1.2.840.113556.1.4.319";
pub const CONTROL_TYPE_MANAGE_DSA_IT: &str = "2.16.840.1.113730.3.4.2";
pub const CONTROL_TYPE_SUBTREE_DELETE: &str = "1.2.840.113556.1.4.805";
pub const CONTROL_TYPE_NO_OP: &str = "1.3.6.1.4.1.4203.1.10.2";
pub const CONTROL_TYPE_SORT_REQUEST: &str = "1.2.840.113556.1.4.473";
pub const CONTROL_TYPE_SORT_RESPONSE: &str = "1.2.840.113556.1.4.474";
pub const CONTROL_TYPE_VLV_REQUEST: &str = "2.16.840.1.113730.3.4.9";
pub const CONTROL_TYPE_VLV_RESPONSE: &str = "2.16.840.1.113730.3.4.10";

/// Context tag wrapping the controls of an LDAPMessage.
pub const CONTROLS_TAG: u8 = 0;

const SORT_ORDERING_RULE_TAG: u8 = 0;
const SORT_REVERSE_ORDER_TAG: u8 = 1;
const SORT_RESPONSE_ATTRIBUTE_TAG: u8 = 0;
const VLV_BY_OFFSET_TAG: u8 = 0;
const VLV_GREATER_OR_EQUAL_TAG: u8 = 1;

type ControlDecoder = fn(bool, Option<&[u8]>) -> Result<Control>;

const DECODERS: &[(&str, ControlDecoder)] = &[
    (CONTROL_TYPE_PAGING, decode_paging),
    (CONTROL_TYPE_SORT_REQUEST, decode_sort_request),
    (CONTROL_TYPE_SORT_RESPONSE, decode_sort_response),
    (CONTROL_TYPE_VLV_REQUEST, decode_vlv_request),
    (CONTROL_TYPE_VLV_RESPONSE, decode_vlv_response),
    (CONTROL_TYPE_MATCHED_VALUES, decode_matched_values),
    (CONTROL_TYPE_PERMISSIVE_MODIFY, decode_permissive_modify),
    (CONTROL_TYPE_MANAGE_DSA_IT, decode_manage_dsa_it),
    (CONTROL_TYPE_NO_OP, decode_no_op),
    (CONTROL_TYPE_SUBTREE_DELETE, decode_subtree_delete),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Paging(PagingControl),
    SortRequest(SortRequestControl),
    SortResponse(SortResponseControl),
    VlvRequest(VlvRequestControl),
    VlvResponse(VlvResponseControl),
    MatchedValues(MatchedValuesControl),
    PermissiveModify { criticality: bool },
    ManageDsaIt { criticality: bool },
    NoOp { criticality: bool },
    SubtreeDelete { criticality: bool },
    /// Any other control, value kept as raw octets.
    Generic(GenericControl),
}

/// Simple paged results (RFC 2696). In responses `page_size` is the
/// server's estimate of the total result count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingControl {
    pub criticality: bool,
    pub page_size: u32,
    pub cookie: Vec<u8>,
}

impl PagingControl {
    pub fn new(page_size: u32) -> Self {
        Self {
            criticality: false,
            page_size,
            cookie: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub ordering_rule: Option<String>,
    pub reverse_order: bool,
}

impl SortKey {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ordering_rule: None,
            reverse_order: false,
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse_order = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRequestControl {
    pub criticality: bool,
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortResponseControl {
    pub criticality: bool,
    pub result: ResultCode,
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VlvTarget {
    ByOffset { offset: i64, content_count: i64 },
    GreaterThanOrEqual(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlvRequestControl {
    pub criticality: bool,
    pub before_count: i64,
    pub after_count: i64,
    pub target: VlvTarget,
    pub context_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlvResponseControl {
    pub criticality: bool,
    pub target_position: i64,
    pub content_count: i64,
    pub result: ResultCode,
    pub context_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedValuesControl {
    pub criticality: bool,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericControl {
    pub control_type: String,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn paging(page_size: u32) -> Self {
        Control::Paging(PagingControl::new(page_size))
    }

    pub fn sort(keys: Vec<SortKey>) -> Self {
        Control::SortRequest(SortRequestControl {
            criticality: false,
            keys,
        })
    }

    pub fn matched_values(filter: impl Into<String>) -> Self {
        Control::MatchedValues(MatchedValuesControl {
            criticality: false,
            filter: filter.into(),
        })
    }

    pub fn vlv_request(before_count: i64, after_count: i64, target: VlvTarget) -> Self {
        Control::VlvRequest(VlvRequestControl {
            criticality: false,
            before_count,
            after_count,
            target,
            context_id: None,
        })
    }

    pub fn permissive_modify(criticality: bool) -> Self {
        Control::PermissiveModify { criticality }
    }

    pub fn manage_dsa_it(criticality: bool) -> Self {
        Control::ManageDsaIt { criticality }
    }

    pub fn subtree_delete(criticality: bool) -> Self {
        Control::SubtreeDelete { criticality }
    }

    /// The no-op control only makes sense as a critical control.
    pub fn no_op() -> Self {
        Control::NoOp { criticality: true }
    }

    pub fn generic(control_type: impl Into<String>, criticality: bool, value: Option<Vec<u8>>) -> Self {
        Control::Generic(GenericControl {
            control_type: control_type.into(),
            criticality,
            value,
        })
    }

    pub fn control_type(&self) -> &str {
        match self {
            Control::Paging(_) => CONTROL_TYPE_PAGING,
            Control::SortRequest(_) => CONTROL_TYPE_SORT_REQUEST,
            Control::SortResponse(_) => CONTROL_TYPE_SORT_RESPONSE,
            Control::VlvRequest(_) => CONTROL_TYPE_VLV_REQUEST,
            Control::VlvResponse(_) => CONTROL_TYPE_VLV_RESPONSE,
            Control::MatchedValues(_) => CONTROL_TYPE_MATCHED_VALUES,
            Control::PermissiveModify { .. } => CONTROL_TYPE_PERMISSIVE_MODIFY,
            Control::ManageDsaIt { .. } => CONTROL_TYPE_MANAGE_DSA_IT,
            Control::NoOp { .. } => CONTROL_TYPE_NO_OP,
            Control::SubtreeDelete { .. } => CONTROL_TYPE_SUBTREE_DELETE,
            Control::Generic(g) => &g.control_type,
        }
    }

    pub fn criticality(&self) -> bool {
        match self {
            Control::Paging(c) => c.criticality,
            Control::SortRequest(c) => c.criticality,
            Control::SortResponse(c) => c.criticality,
            Control::VlvRequest(c) => c.criticality,
            Control::VlvResponse(c) => c.criticality,
            Control::MatchedValues(c) => c.criticality,
            Control::PermissiveModify { criticality }
            | Control::ManageDsaIt { criticality }
            | Control::NoOp { criticality }
            | Control::SubtreeDelete { criticality } => *criticality,
            Control::Generic(g) => g.criticality,
        }
    }

    /// Encode as `Control ::= SEQUENCE { controlType, criticality DEFAULT FALSE, controlValue OPTIONAL }`.
    pub fn encode(&self) -> Result<Packet> {
        let value = match self {
            Control::Paging(c) => Some(encode_paging(c)),
            Control::SortRequest(c) => Some(encode_sort_request(c)),
            Control::VlvRequest(c) => Some(encode_vlv_request(c)),
            Control::MatchedValues(c) => Some(encode_matched_values(c)?),
            Control::SortResponse(_) | Control::VlvResponse(_) => {
                return Err(LdapError::Encoding(format!(
                    "{} is a response control",
                    control_type_name(self.control_type())
                )))
            }
            Control::PermissiveModify { .. }
            | Control::ManageDsaIt { .. }
            | Control::NoOp { .. }
            | Control::SubtreeDelete { .. } => None,
            Control::Generic(g) => g.value.clone(),
        };

        let mut packet = Packet::sequence().with_child(Packet::octet_string(self.control_type()));
        if self.criticality() {
            packet.append_child(Packet::boolean(true));
        }
        if let Some(value) = value {
            packet.append_child(Packet::octet_bytes(value));
        }
        Ok(packet)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Control Type: {} ({}) Criticality: {}",
            control_type_name(self.control_type()),
            self.control_type(),
            self.criticality()
        )?;
        match self {
            Control::Paging(c) => write!(f, " PagingSize: {} Cookie: {:?}", c.page_size, c.cookie),
            Control::SortResponse(c) => write!(f, " Result: {}", c.result),
            Control::VlvResponse(c) => write!(
                f,
                " TargetPosition: {} ContentCount: {} Result: {}",
                c.target_position, c.content_count, c.result
            ),
            Control::MatchedValues(c) => write!(f, " Filter: {}", c.filter),
            Control::Generic(GenericControl {
                value: Some(value), ..
            }) => write!(f, " Value: {}", String::from_utf8_lossy(value)),
            _ => Ok(()),
        }
    }
}

pub fn control_type_name(oid: &str) -> &'static str {
    match oid {
        CONTROL_TYPE_MATCHED_VALUES => "MatchedValuesRequest",
        CONTROL_TYPE_PERMISSIVE_MODIFY => "PermissiveModifyRequest",
        CONTROL_TYPE_PAGING => "Paging",
        CONTROL_TYPE_MANAGE_DSA_IT => "ManageDsaITRequest",
        CONTROL_TYPE_SUBTREE_DELETE => "SubtreeDeleteRequest",
        CONTROL_TYPE_NO_OP => "NoOpRequest",
        CONTROL_TYPE_SORT_REQUEST => "ServerSideSortRequest",
        CONTROL_TYPE_SORT_RESPONSE => "ServerSideSortResponse",
        CONTROL_TYPE_VLV_REQUEST => "VlvRequest",
        CONTROL_TYPE_VLV_RESPONSE => "VlvResponse",
        _ => "Unknown",
    }
}

/// Decode one Control element. Unregistered OIDs yield [`Control::Generic`].
pub fn decode_control(packet: &Packet) -> Result<Control> {
    let control_type = packet.child(0)?.as_str()?.to_string();
    let mut criticality = false;
    let mut value: Option<Vec<u8>> = None;
    for child in packet.children().iter().skip(1) {
        if child.is(Class::Universal, TAG_BOOLEAN) {
            criticality = child.as_bool()?;
        } else if child.is(Class::Universal, TAG_OCTET_STRING) {
            value = Some(child.as_bytes().to_vec());
        } else {
            return Err(LdapError::Decoding(format!(
                "unexpected element in control {}",
                control_type
            )));
        }
    }

    match DECODERS.iter().find(|(oid, _)| *oid == control_type) {
        Some((_, decode)) => decode(criticality, value.as_deref()),
        None => Ok(Control::Generic(GenericControl {
            control_type,
            criticality,
            value,
        })),
    }
}

/// Encode the `[0] Controls` field of an LDAPMessage.
pub fn encode_controls(controls: &[Control]) -> Result<Packet> {
    let mut packet = Packet::constructed(Class::Context, CONTROLS_TAG);
    for control in controls {
        packet.append_child(control.encode()?);
    }
    Ok(packet)
}

pub fn decode_controls(packet: &Packet) -> Result<Vec<Control>> {
    packet.children().iter().map(decode_control).collect()
}

pub fn find_control<'a>(controls: &'a [Control], control_type: &str) -> Option<(usize, &'a Control)> {
    controls
        .iter()
        .enumerate()
        .find(|(_, c)| c.control_type() == control_type)
}

/// Replace the control with the same type, or append it. Returns the old one.
pub fn replace_control(controls: &mut Vec<Control>, control: Control) -> Option<Control> {
    match controls
        .iter()
        .position(|c| c.control_type() == control.control_type())
    {
        Some(index) => Some(std::mem::replace(&mut controls[index], control)),
        None => {
            controls.push(control);
            None
        }
    }
}

fn value_packet(control_type: &str, value: Option<&[u8]>) -> Result<Packet> {
    let value = value.ok_or_else(|| {
        LdapError::Decoding(format!("{} control without value", control_type_name(control_type)))
    })?;
    crate::ber::decode(value)
}

fn decode_permissive_modify(criticality: bool, _: Option<&[u8]>) -> Result<Control> {
    Ok(Control::PermissiveModify { criticality })
}

fn decode_manage_dsa_it(criticality: bool, _: Option<&[u8]>) -> Result<Control> {
    Ok(Control::ManageDsaIt { criticality })
}

fn decode_no_op(criticality: bool, _: Option<&[u8]>) -> Result<Control> {
    Ok(Control::NoOp { criticality })
}

fn decode_subtree_delete(criticality: bool, _: Option<&[u8]>) -> Result<Control> {
    Ok(Control::SubtreeDelete { criticality })
}

fn encode_paging(c: &PagingControl) -> Vec<u8> {
    Packet::sequence()
        .with_child(Packet::integer(c.page_size as i64))
        .with_child(Packet::octet_bytes(c.cookie.clone()))
        .to_bytes()
}

fn decode_paging(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_PAGING, value)?;
    let page_size = packet.child(0)?.as_i64()?;
    let page_size = u32::try_from(page_size)
        .map_err(|_| LdapError::Decoding(format!("invalid paging size {}", page_size)))?;
    let cookie = packet.child(1)?.as_bytes().to_vec();
    Ok(Control::Paging(PagingControl {
        criticality,
        page_size,
        cookie,
    }))
}

fn encode_sort_request(c: &SortRequestControl) -> Vec<u8> {
    let mut keys = Packet::sequence();
    for key in &c.keys {
        let mut item = Packet::sequence().with_child(Packet::octet_string(key.attribute.clone()));
        if let Some(rule) = &key.ordering_rule {
            item.append_child(Packet::tagged_string(
                Class::Context,
                SORT_ORDERING_RULE_TAG,
                rule.clone(),
            ));
        }
        if key.reverse_order {
            item.append_child(Packet::tagged_boolean(
                Class::Context,
                SORT_REVERSE_ORDER_TAG,
                true,
            ));
        }
        keys.append_child(item);
    }
    keys.to_bytes()
}

fn decode_sort_request(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_SORT_REQUEST, value)?;
    let mut keys = Vec::new();
    for item in packet.children() {
        let mut key = SortKey::new(item.child(0)?.as_str()?);
        for field in item.children().iter().skip(1) {
            if field.is(Class::Context, SORT_ORDERING_RULE_TAG) {
                key.ordering_rule = Some(field.as_str()?.to_string());
            } else if field.is(Class::Context, SORT_REVERSE_ORDER_TAG) {
                key.reverse_order = field.as_bool()?;
            }
        }
        keys.push(key);
    }
    Ok(Control::SortRequest(SortRequestControl { criticality, keys }))
}

fn decode_sort_response(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_SORT_RESPONSE, value)?;
    let result = ResultCode::from_wire(packet.child(0)?.as_i64()?)?;
    let attribute = match packet.children().get(1) {
        Some(field) if field.is(Class::Context, SORT_RESPONSE_ATTRIBUTE_TAG) => {
            Some(field.as_str()?.to_string())
        }
        _ => None,
    };
    Ok(Control::SortResponse(SortResponseControl {
        criticality,
        result,
        attribute,
    }))
}

fn encode_vlv_request(c: &VlvRequestControl) -> Vec<u8> {
    let target = match &c.target {
        VlvTarget::ByOffset {
            offset,
            content_count,
        } => Packet::constructed(Class::Context, VLV_BY_OFFSET_TAG)
            .with_child(Packet::integer(*offset))
            .with_child(Packet::integer(*content_count)),
        VlvTarget::GreaterThanOrEqual(value) => {
            Packet::tagged_bytes(Class::Context, VLV_GREATER_OR_EQUAL_TAG, value.clone())
        }
    };
    let mut packet = Packet::sequence()
        .with_child(Packet::integer(c.before_count))
        .with_child(Packet::integer(c.after_count))
        .with_child(target);
    if let Some(context_id) = &c.context_id {
        packet.append_child(Packet::octet_bytes(context_id.clone()));
    }
    packet.to_bytes()
}

fn decode_vlv_request(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_VLV_REQUEST, value)?;
    let before_count = packet.child(0)?.as_i64()?;
    let after_count = packet.child(1)?.as_i64()?;
    let target_field = packet.child(2)?;
    let target = if target_field.is(Class::Context, VLV_BY_OFFSET_TAG) && target_field.is_constructed() {
        VlvTarget::ByOffset {
            offset: target_field.child(0)?.as_i64()?,
            content_count: target_field.child(1)?.as_i64()?,
        }
    } else if target_field.is(Class::Context, VLV_GREATER_OR_EQUAL_TAG) {
        VlvTarget::GreaterThanOrEqual(target_field.as_bytes().to_vec())
    } else {
        return Err(LdapError::Decoding("unknown VLV target".to_string()));
    };
    let context_id = packet.children().get(3).map(|p| p.as_bytes().to_vec());
    Ok(Control::VlvRequest(VlvRequestControl {
        criticality,
        before_count,
        after_count,
        target,
        context_id,
    }))
}

fn decode_vlv_response(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_VLV_RESPONSE, value)?;
    Ok(Control::VlvResponse(VlvResponseControl {
        criticality,
        target_position: packet.child(0)?.as_i64()?,
        content_count: packet.child(1)?.as_i64()?,
        result: ResultCode::from_wire(packet.child(2)?.as_i64()?)?,
        context_id: packet.children().get(3).map(|p| p.as_bytes().to_vec()),
    }))
}

/// `ValuesReturnFilter ::= SEQUENCE OF SimpleFilterItem`
fn encode_matched_values(c: &MatchedValuesControl) -> Result<Vec<u8>> {
    let filter = filter::compile(&c.filter)?;
    Ok(Packet::sequence().with_child(filter).to_bytes())
}

fn decode_matched_values(criticality: bool, value: Option<&[u8]>) -> Result<Control> {
    let packet = value_packet(CONTROL_TYPE_MATCHED_VALUES, value)?;
    let mut filter = String::new();
    for item in packet.children() {
        filter.push_str(&filter::decompile(item)?);
    }
    Ok(Control::MatchedValues(MatchedValuesControl { criticality, filter }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber;

    fn roundtrip(control: &Control) -> Control {
        let bytes = control.encode().unwrap().to_bytes();
        decode_control(&ber::decode(&bytes).unwrap()).unwrap()
    }

    #[test]
    fn test_request_controls_roundtrip() {
        let controls = vec![
            Control::Paging(PagingControl {
                criticality: true,
                page_size: 500,
                cookie: b"opaque".to_vec(),
            }),
            Control::sort(vec![
                SortKey::new("cn"),
                SortKey {
                    attribute: "sn".to_string(),
                    ordering_rule: Some("2.5.13.3".to_string()),
                    reverse_order: true,
                },
            ]),
            Control::vlv_request(
                0,
                9,
                VlvTarget::ByOffset {
                    offset: 1,
                    content_count: 0,
                },
            ),
            Control::VlvRequest(VlvRequestControl {
                criticality: true,
                before_count: 2,
                after_count: 2,
                target: VlvTarget::GreaterThanOrEqual(b"m".to_vec()),
                context_id: Some(b"ctx".to_vec()),
            }),
            Control::matched_values("(cn=John)"),
            Control::permissive_modify(false),
            Control::manage_dsa_it(true),
            Control::no_op(),
            Control::subtree_delete(false),
            Control::generic("1.2.3.4", false, Some(b"value".to_vec())),
            Control::generic("1.2.3.5", true, None),
        ];
        for control in &controls {
            assert_eq!(&roundtrip(control), control);
        }
    }

    #[test]
    fn test_criticality_omitted_when_false() {
        let packet = Control::ManageDsaIt { criticality: false }.encode().unwrap();
        assert_eq!(packet.children().len(), 1);
        let packet = Control::no_op().encode().unwrap();
        assert_eq!(packet.children().len(), 2);
        assert!(packet.child(1).unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_unknown_oid_is_generic() {
        let packet = Packet::sequence()
            .with_child(Packet::octet_string("1.3.6.1.4.1.99999.1"))
            .with_child(Packet::octet_bytes(vec![0xDE, 0xAD]));
        match decode_control(&packet).unwrap() {
            Control::Generic(g) => {
                assert_eq!(g.control_type, "1.3.6.1.4.1.99999.1");
                assert!(!g.criticality);
                assert_eq!(g.value, Some(vec![0xDE, 0xAD]));
            }
            other => panic!("unexpected control {:?}", other),
        }
    }

    #[test]
    fn test_decode_response_controls() {
        let sort_value = Packet::sequence()
            .with_child(Packet::enumerated(0))
            .with_child(Packet::tagged_string(Class::Context, 0, "cn"))
            .to_bytes();
        let packet = Packet::sequence()
            .with_child(Packet::octet_string(CONTROL_TYPE_SORT_RESPONSE))
            .with_child(Packet::octet_bytes(sort_value));
        match decode_control(&packet).unwrap() {
            Control::SortResponse(c) => {
                assert!(c.result.is_success());
                assert_eq!(c.attribute.as_deref(), Some("cn"));
            }
            other => panic!("unexpected control {:?}", other),
        }

        let vlv_value = Packet::sequence()
            .with_child(Packet::integer(5))
            .with_child(Packet::integer(120))
            .with_child(Packet::enumerated(0))
            .to_bytes();
        let packet = Packet::sequence()
            .with_child(Packet::octet_string(CONTROL_TYPE_VLV_RESPONSE))
            .with_child(Packet::octet_bytes(vlv_value));
        match decode_control(&packet).unwrap() {
            Control::VlvResponse(c) => {
                assert_eq!(c.target_position, 5);
                assert_eq!(c.content_count, 120);
                assert_eq!(c.context_id, None);
            }
            other => panic!("unexpected control {:?}", other),
        }
    }

    #[test]
    fn test_response_controls_do_not_encode() {
        let control = Control::SortResponse(SortResponseControl {
            criticality: false,
            result: ResultCode::SUCCESS,
            attribute: None,
        });
        assert!(matches!(control.encode(), Err(LdapError::Encoding(_))));
    }

    #[test]
    fn test_paging_without_value_is_error() {
        let packet = Packet::sequence().with_child(Packet::octet_string(CONTROL_TYPE_PAGING));
        assert!(decode_control(&packet).is_err());
    }

    #[test]
    fn test_find_and_replace() {
        let mut controls = vec![Control::ManageDsaIt { criticality: false }];
        assert!(find_control(&controls, CONTROL_TYPE_PAGING).is_none());
        assert!(replace_control(&mut controls, Control::paging(10)).is_none());
        assert_eq!(controls.len(), 2);
        let old = replace_control(&mut controls, Control::paging(20)).unwrap();
        assert_eq!(old, Control::paging(10));
        assert_eq!(controls.len(), 2);
        let (index, found) = find_control(&controls, CONTROL_TYPE_PAGING).unwrap();
        assert_eq!(index, 1);
        assert_eq!(found, &Control::paging(20));
    }

    #[test]
    fn test_display() {
        let text = Control::paging(100).to_string();
        assert!(text.starts_with("Control Type: Paging (1.2.840.113556.1.4.319)"));
        assert!(text.contains("PagingSize: 100"));
    }
}
