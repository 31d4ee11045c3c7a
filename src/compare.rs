use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::error::Result;
use crate::protocol::{self, APP_COMPARE_REQUEST, APP_COMPARE_RESPONSE};
use crate::result_code::{decode_ldap_result, ResultCode};
use std::time::Instant;

/// `CompareRequest ::= [APPLICATION 14] SEQUENCE { entry, ava AttributeValueAssertion }`
fn encode_compare(dn: &str, attribute: &str, value: &[u8]) -> Packet {
    Packet::constructed(Class::Application, APP_COMPARE_REQUEST)
        .with_child(Packet::octet_string(dn))
        .with_child(
            Packet::sequence()
                .with_child(Packet::octet_string(attribute))
                .with_child(Packet::octet_bytes(value.to_vec())),
        )
}

impl Connection {
    /// True for compareTrue, false for compareFalse; any other code is an error.
    pub async fn compare(&self, dn: &str, attribute: &str, value: &str) -> Result<bool> {
        let start = Instant::now();
        let outcome = async {
            let envelope = self
                .send_and_await(encode_compare(dn, attribute, value.as_bytes()), &[], None)
                .await?;
            let response = protocol::expect_response(envelope, APP_COMPARE_RESPONSE)?;
            let result = decode_ldap_result(&response)?;
            match result.code {
                ResultCode::COMPARE_TRUE => Ok(true),
                ResultCode::COMPARE_FALSE => Ok(false),
                _ => Err(result.into_error()),
            }
        }
        .await;
        self.metrics().record("compare", start.elapsed(), outcome.is_ok());
        outcome
    }
}
