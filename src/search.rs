//! Search operation (RFC 4511 section 4.5): request encoding, streaming
//! result handling and simple paged results (RFC 2696).

use crate::ber::{Class, Packet};
use crate::conn::Connection;
use crate::control::{self, Control, PagingControl};
use crate::entry::Entry;
use crate::error::{LdapError, Result};
use crate::filter;
use crate::protocol::{
    self, application_name, APP_INTERMEDIATE_RESPONSE, APP_SEARCH_REQUEST,
    APP_SEARCH_RESULT_DONE, APP_SEARCH_RESULT_ENTRY, APP_SEARCH_RESULT_REFERENCE,
};
use crate::result_code::{decode_ldap_result, ResultCode};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObject = 2,
    Always = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: Scope,
    pub deref_aliases: DerefAliases,
    pub size_limit: i32,
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: String,
    pub attributes: Vec<String>,
    pub controls: Vec<Control>,
    /// Per-frame response timeout; the connection default when unset.
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(base_dn: impl Into<String>, scope: Scope, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            deref_aliases: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter: filter.into(),
            attributes: Vec::new(),
            controls: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_deref_aliases(mut self, deref_aliases: DerefAliases) -> Self {
        self.deref_aliases = deref_aliases;
        self
    }

    /// Zero means no client-requested limit.
    pub fn with_size_limit(mut self, size_limit: i32) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Seconds; zero means no client-requested limit.
    pub fn with_time_limit(mut self, time_limit: i32) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_types_only(mut self, types_only: bool) -> Self {
        self.types_only = types_only;
        self
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn add_control(&mut self, control: Control) {
        self.controls.push(control);
    }

    /// Replace the control of the same type, or add it.
    pub fn replace_control(&mut self, control: Control) -> Option<Control> {
        control::replace_control(&mut self.controls, control)
    }

    pub(crate) fn encode(&self) -> Result<Packet> {
        if self.size_limit < 0 || self.time_limit < 0 {
            return Err(LdapError::InvalidArgument(
                "size and time limits must not be negative".to_string(),
            ));
        }
        let mut attributes = Packet::sequence();
        for attribute in &self.attributes {
            attributes.append_child(Packet::octet_string(attribute.clone()));
        }
        Ok(Packet::constructed(Class::Application, APP_SEARCH_REQUEST)
            .with_child(Packet::octet_string(self.base_dn.clone()))
            .with_child(Packet::enumerated(self.scope as i64))
            .with_child(Packet::enumerated(self.deref_aliases as i64))
            .with_child(Packet::integer(self.size_limit as i64))
            .with_child(Packet::integer(self.time_limit as i64))
            .with_child(Packet::boolean(self.types_only))
            .with_child(filter::compile(&self.filter)?)
            .with_child(attributes))
    }
}

/// One response frame of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscreteSearchResult {
    Entry(Entry),
    Reference(Vec<String>),
    /// SearchResultDone with success (or referral) plus its response controls.
    Done {
        controls: Vec<Control>,
        referrals: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub entries: Vec<Entry>,
    /// URIs from search references and from a referral result.
    pub referrals: Vec<String>,
    pub controls: Vec<Control>,
}

/// Receives each search result as it arrives. Returning `Ok(true)` stops the
/// search early: the request is abandoned and later frames are dropped.
pub trait ResultHandler {
    fn process(&mut self, result: DiscreteSearchResult) -> Result<bool>;
}

impl ResultHandler for SearchResult {
    fn process(&mut self, result: DiscreteSearchResult) -> Result<bool> {
        match result {
            DiscreteSearchResult::Entry(entry) => self.entries.push(entry),
            DiscreteSearchResult::Reference(urls) => self.referrals.extend(urls),
            DiscreteSearchResult::Done {
                controls,
                referrals,
            } => {
                self.controls.extend(controls);
                self.referrals.extend(referrals);
            }
        }
        Ok(false)
    }
}

impl<F> ResultHandler for F
where
    F: FnMut(DiscreteSearchResult) -> Result<bool>,
{
    fn process(&mut self, result: DiscreteSearchResult) -> Result<bool> {
        self(result)
    }
}

impl Connection {
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let mut result = SearchResult::default();
        self.search_with_handler(request, &mut result).await?;
        Ok(result)
    }

    /// Stream results to `handler` until SearchResultDone, an error, or the
    /// handler asks to stop.
    pub async fn search_with_handler<H>(&self, request: &SearchRequest, handler: &mut H) -> Result<()>
    where
        H: ResultHandler + ?Sized,
    {
        let start = Instant::now();
        let outcome = self.run_search(request, handler).await;
        self.metrics().record("search", start.elapsed(), outcome.is_ok());
        outcome
    }

    async fn run_search<H>(&self, request: &SearchRequest, handler: &mut H) -> Result<()>
    where
        H: ResultHandler + ?Sized,
    {
        let op = request.encode()?;
        let timeout = self.effective_timeout(request.timeout);
        let mut exchange = self.send_request(op, &request.controls).await?;
        loop {
            let envelope = match exchange.next(timeout).await {
                Ok(envelope) => envelope,
                Err(LdapError::Timeout { message_id }) => {
                    drop(exchange);
                    self.on_timeout(message_id).await;
                    return Err(LdapError::Timeout { message_id });
                }
                Err(e) => return Err(e),
            };
            let Some(result) = decode_search_response(&envelope)? else {
                continue;
            };
            let done = matches!(result, DiscreteSearchResult::Done { .. });
            let stop = handler.process(result)?;
            if done {
                return Ok(());
            }
            if stop {
                let message_id = exchange.message_id();
                drop(exchange);
                debug!(message_id, "search stopped by handler");
                if let Err(e) = self.abandon(message_id).await {
                    debug!(message_id, error = %e, "abandon after early stop failed");
                }
                return Ok(());
            }
        }
    }

    /// Run `request` page by page with the paging control, following the
    /// server's cookie until it comes back empty.
    pub async fn search_with_paging(&self, request: &SearchRequest, page_size: u32) -> Result<SearchResult> {
        if page_size == 0 {
            return Err(LdapError::InvalidArgument("page size must be positive".to_string()));
        }
        let mut request = request.clone();
        // Always restart from an empty cookie; only the caller's criticality survives.
        let mut paging = PagingControl::new(page_size);
        if let Some((_, Control::Paging(existing))) =
            control::find_control(&request.controls, control::CONTROL_TYPE_PAGING)
        {
            paging.criticality = existing.criticality;
        }
        request.replace_control(Control::Paging(paging.clone()));

        let mut all = SearchResult::default();
        let mut pages = 0usize;
        loop {
            let mut page = SearchResult::default();
            self.search_with_handler(&request, &mut page).await?;
            pages += 1;
            let cookie = page.controls.iter().find_map(|c| match c {
                Control::Paging(p) => Some(p.cookie.clone()),
                _ => None,
            });
            all.entries.extend(page.entries);
            all.referrals.extend(page.referrals);
            all.controls.extend(page.controls);

            match cookie {
                None if pages == 1 => {
                    debug!("server returned no paging control; treating result as complete");
                    return Ok(all);
                }
                None => {
                    return Err(LdapError::MissingControl(format!(
                        "expected paging control in page {}",
                        pages
                    )))
                }
                Some(cookie) if cookie.is_empty() => {
                    debug!(pages, entries = all.entries.len(), "paged search complete");
                    return Ok(all);
                }
                Some(cookie) => {
                    paging.cookie = cookie;
                    request.replace_control(Control::Paging(paging.clone()));
                }
            }
        }
    }
}

/// Classify one search response frame. Intermediate responses yield `None`.
pub fn decode_search_response(envelope: &Packet) -> Result<Option<DiscreteSearchResult>> {
    let op = protocol::protocol_op(envelope)?;
    match op.tag() {
        APP_SEARCH_RESULT_ENTRY => Ok(Some(DiscreteSearchResult::Entry(decode_entry(op)?))),
        APP_SEARCH_RESULT_REFERENCE => Ok(Some(DiscreteSearchResult::Reference(
            op.children().iter().map(Packet::to_string_lossy).collect(),
        ))),
        APP_SEARCH_RESULT_DONE => {
            let result = decode_ldap_result(op)?;
            if !result.code.is_success() && result.code != ResultCode::REFERRAL {
                return Err(result.into_error());
            }
            if result.code == ResultCode::REFERRAL && result.referrals.is_empty() {
                return Err(result.into_error());
            }
            Ok(Some(DiscreteSearchResult::Done {
                controls: protocol::response_controls(envelope)?,
                referrals: result.referrals,
            }))
        }
        APP_INTERMEDIATE_RESPONSE => {
            debug!("ignoring intermediate response during search");
            Ok(None)
        }
        other => Err(LdapError::Decoding(format!(
            "unexpected {} in search response",
            application_name(other)
        ))),
    }
}

/// `SearchResultEntry ::= [APPLICATION 4] SEQUENCE { objectName, attributes PartialAttributeList }`
fn decode_entry(op: &Packet) -> Result<Entry> {
    let mut entry = Entry::new(op.child(0)?.as_str()?);
    for attribute in op.child(1)?.children() {
        let name = attribute.child(0)?.as_str()?.to_string();
        let values = attribute
            .child(1)?
            .children()
            .iter()
            .map(|v| v.as_bytes().to_vec())
            .collect();
        entry.push_values(&name, values);
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber;

    fn envelope(op: Packet) -> Packet {
        protocol::build_envelope(1, op, &[]).unwrap()
    }

    fn entry_op(dn: &str, attrs: &[(&str, &[&str])]) -> Packet {
        let mut list = Packet::sequence();
        for (name, values) in attrs {
            let mut set = Packet::set();
            for v in *values {
                set.append_child(Packet::octet_string(*v));
            }
            list.append_child(
                Packet::sequence()
                    .with_child(Packet::octet_string(*name))
                    .with_child(set),
            );
        }
        Packet::constructed(Class::Application, APP_SEARCH_RESULT_ENTRY)
            .with_child(Packet::octet_string(dn))
            .with_child(list)
    }

    fn done_op(code: i64) -> Packet {
        Packet::constructed(Class::Application, APP_SEARCH_RESULT_DONE)
            .with_child(Packet::enumerated(code))
            .with_child(Packet::octet_string(""))
            .with_child(Packet::octet_string(""))
    }

    #[test]
    fn test_encode_search_request() {
        let request = SearchRequest::new("dc=example,dc=com", Scope::WholeSubtree, "(uid=jdoe)")
            .with_attributes(["cn", "mail"]);
        let op = ber::decode(&request.encode().unwrap().to_bytes()).unwrap();
        assert!(op.is(Class::Application, APP_SEARCH_REQUEST));
        assert_eq!(op.children().len(), 8);
        assert_eq!(op.child(0).unwrap().as_str().unwrap(), "dc=example,dc=com");
        assert_eq!(op.child(1).unwrap().as_i64().unwrap(), 2);
        assert_eq!(op.child(2).unwrap().as_i64().unwrap(), 0);
        assert!(!op.child(5).unwrap().as_bool().unwrap());
        assert_eq!(filter::decompile(op.child(6).unwrap()).unwrap(), "(uid=jdoe)");
        assert_eq!(op.child(7).unwrap().children().len(), 2);
    }

    #[test]
    fn test_encode_rejects_bad_filter() {
        let request = SearchRequest::new("", Scope::BaseObject, "(objectClass=*");
        assert!(matches!(request.encode(), Err(LdapError::FilterCompile(_))));
    }

    #[test]
    fn test_decode_entry() {
        let op = entry_op("cn=a,dc=x", &[("cn", &["a"]), ("mail", &["a@x", "b@x"])]);
        match decode_search_response(&envelope(op)).unwrap() {
            Some(DiscreteSearchResult::Entry(entry)) => {
                assert_eq!(entry.dn, "cn=a,dc=x");
                assert_eq!(entry.attribute_values("MAIL"), &["a@x", "b@x"]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_decode_reference() {
        let op = Packet::constructed(Class::Application, APP_SEARCH_RESULT_REFERENCE)
            .with_child(Packet::octet_string("ldap://other.example.com/dc=x"));
        assert_eq!(
            decode_search_response(&envelope(op)).unwrap(),
            Some(DiscreteSearchResult::Reference(vec![
                "ldap://other.example.com/dc=x".to_string()
            ]))
        );
    }

    #[test]
    fn test_decode_done_with_controls() {
        let envelope = protocol::build_envelope(
            4,
            done_op(0),
            &[Control::Paging(PagingControl {
                criticality: false,
                page_size: 0,
                cookie: b"next".to_vec(),
            })],
        )
        .unwrap();
        let wire = ber::decode(&envelope.to_bytes()).unwrap();
        match decode_search_response(&wire).unwrap() {
            Some(DiscreteSearchResult::Done { controls, referrals }) => {
                assert!(referrals.is_empty());
                assert_eq!(controls.len(), 1);
                assert!(matches!(&controls[0], Control::Paging(p) if p.cookie == b"next"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_decode_done_failure() {
        let err = decode_search_response(&envelope(done_op(32))).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::NO_SUCH_OBJECT);
    }

    #[test]
    fn test_decode_unexpected_op() {
        let op = Packet::constructed(Class::Application, protocol::APP_BIND_RESPONSE);
        assert!(matches!(
            decode_search_response(&envelope(op)),
            Err(LdapError::Decoding(_))
        ));
    }

    #[test]
    fn test_search_result_accumulates() {
        let mut result = SearchResult::default();
        assert!(!result
            .process(DiscreteSearchResult::Entry(Entry::new("cn=a")))
            .unwrap());
        result
            .process(DiscreteSearchResult::Reference(vec!["ldap://x/".to_string()]))
            .unwrap();
        result
            .process(DiscreteSearchResult::Done {
                controls: vec![Control::paging(5)],
                referrals: vec![],
            })
            .unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.referrals, vec!["ldap://x/".to_string()]);
        assert_eq!(result.controls, vec![Control::paging(5)]);
    }

    #[test]
    fn test_replace_control_on_request() {
        let mut request = SearchRequest::new("", Scope::BaseObject, "(objectClass=*)");
        request.add_control(Control::ManageDsaIt { criticality: false });
        request.replace_control(Control::paging(10));
        request.replace_control(Control::paging(20));
        assert_eq!(request.controls.len(), 2);
        assert_eq!(request.controls[1], Control::paging(20));
    }
}
