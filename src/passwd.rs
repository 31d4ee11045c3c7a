//! RFC 3062 Password Modify extended operation.

use crate::ber::{self, Class, Packet};
use crate::conn::Connection;
use crate::control::Control;
use crate::error::{LdapError, Result};
use crate::extended::ExtendedRequest;
use crate::protocol::PASSWORD_MODIFY_OID;

const USER_IDENTITY_TAG: u8 = 0;
const OLD_PASSWORD_TAG: u8 = 1;
const NEW_PASSWORD_TAG: u8 = 2;
const GENERATED_PASSWORD_TAG: u8 = 0;

/// Every field is optional. Without `user_identity` the bound user is
/// changed; without `new_password` the server generates one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordModifyRequest {
    pub user_identity: Option<String>,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordModifyResult {
    pub generated_password: Option<String>,
}

impl PasswordModifyRequest {
    pub fn new(
        user_identity: Option<String>,
        old_password: Option<String>,
        new_password: Option<String>,
    ) -> Self {
        Self {
            user_identity,
            old_password,
            new_password,
            controls: Vec::new(),
        }
    }

    /// `PasswdModifyRequestValue ::= SEQUENCE { userIdentity [0], oldPasswd [1], newPasswd [2] }`
    fn encode_value(&self) -> Vec<u8> {
        let mut value = Packet::sequence();
        let fields = [
            (USER_IDENTITY_TAG, &self.user_identity),
            (OLD_PASSWORD_TAG, &self.old_password),
            (NEW_PASSWORD_TAG, &self.new_password),
        ];
        for (tag, field) in fields {
            if let Some(field) = field {
                value.append_child(Packet::tagged_string(Class::Context, tag, field.clone()));
            }
        }
        value.to_bytes()
    }
}

fn decode_result(value: Option<&[u8]>) -> Result<PasswordModifyResult> {
    let Some(value) = value else {
        return Ok(PasswordModifyResult::default());
    };
    let packet = ber::decode(value)?;
    if !packet.is_constructed() {
        return Err(LdapError::Decoding(
            "password modify response value is not a sequence".to_string(),
        ));
    }
    let generated_password = packet
        .children()
        .iter()
        .find(|field| field.is(Class::Context, GENERATED_PASSWORD_TAG))
        .map(Packet::to_string_lossy);
    Ok(PasswordModifyResult { generated_password })
}

impl Connection {
    pub async fn password_modify(
        &self,
        request: &PasswordModifyRequest,
    ) -> Result<PasswordModifyResult> {
        let mut extended = ExtendedRequest::new(PASSWORD_MODIFY_OID, Some(request.encode_value()));
        extended.controls = request.controls.clone();
        let response = self.extended_request(&extended).await?;
        decode_result(response.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_skips_missing_fields() {
        let request = PasswordModifyRequest::new(
            Some("uid=jdoe,dc=example,dc=com".to_string()),
            None,
            Some("s3cret".to_string()),
        );
        let value = ber::decode(&request.encode_value()).unwrap();
        assert_eq!(value.children().len(), 2);
        assert!(value.child(0).unwrap().is(Class::Context, USER_IDENTITY_TAG));
        let new_password = value.child(1).unwrap();
        assert!(new_password.is(Class::Context, NEW_PASSWORD_TAG));
        assert_eq!(new_password.as_bytes(), b"s3cret");
    }

    #[test]
    fn test_empty_request_value() {
        assert_eq!(PasswordModifyRequest::default().encode_value(), vec![0x30, 0x00]);
    }

    #[test]
    fn test_decode_generated_password() {
        let value = Packet::sequence()
            .with_child(Packet::tagged_string(Class::Context, GENERATED_PASSWORD_TAG, "xyzzy"))
            .to_bytes();
        let result = decode_result(Some(&value)).unwrap();
        assert_eq!(result.generated_password.as_deref(), Some("xyzzy"));
        assert_eq!(decode_result(None).unwrap(), PasswordModifyResult::default());
    }
}
