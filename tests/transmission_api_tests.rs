mod common;

use bifrost::config::ServerConfig;
use bifrost::dns::{
    DNSHeader, DNSPacket, DNSQuestion, DNSRcode, DNSResourceClass, DNSResourceType,
};
use bifrost::resolver::Resolver;
use bifrost::session::{Forwarder, PortPool, SessionHandler};
use bifrost::zone::FixedZone;
use common::MockRawNetwork;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const ZONE: &str = "t.example.com";

fn test_config() -> ServerConfig {
    ServerConfig {
        zone: ZONE.to_string(),
        public_ip: "198.51.100.7".parse().unwrap(),
        ..Default::default()
    }
}

fn test_resolver_with(fixed: FixedZone) -> Resolver {
    let config = test_config();
    let ports = PortPool::new(30000..30010);
    let forwarder = Forwarder::new(
        config.public_ip,
        Duration::from_millis(100),
        ports,
        Arc::new(MockRawNetwork::new()),
    );
    let sessions = Arc::new(SessionHandler::new(forwarder, 64, 8000));
    Resolver::new(&config, fixed, sessions)
}

fn test_resolver() -> Resolver {
    test_resolver_with(FixedZone::new())
}

fn query(name: &str) -> DNSPacket {
    DNSPacket {
        header: DNSHeader {
            id: 0x1234,
            rd: true,
            qdcount: 1,
            ..Default::default()
        },
        questions: vec![DNSQuestion {
            labels: name.split('.').map(str::to_string).collect(),
            qtype: DNSResourceType::TXT,
            qclass: DNSResourceClass::IN,
        }],
        answers: Vec::new(),
        authorities: Vec::new(),
        additionals: Vec::new(),
    }
}

/// Parse the TXT answers back into an attribute map
fn attributes(response: &DNSPacket) -> BTreeMap<String, String> {
    response
        .answers
        .iter()
        .map(|rr| {
            let text = rr.txt_segments().expect("txt rdata").concat();
            let (key, value) = text.split_once('=').expect("attribute");
            (key.to_string(), value.to_string())
        })
        .collect()
}

fn expect_success(response: &DNSPacket) -> BTreeMap<String, String> {
    let attrs = attributes(response);
    assert_eq!(attrs.get("success").map(String::as_str), Some("True"), "{attrs:?}");
    attrs
}

fn expect_failure(response: &DNSPacket) -> BTreeMap<String, String> {
    let attrs = attributes(response);
    assert_eq!(attrs.get("success").map(String::as_str), Some("False"), "{attrs:?}");
    assert!(attrs.contains_key("error"));
    attrs
}

#[tokio::test(flavor = "multi_thread")]
async fn begin_is_idempotent_under_retry() {
    let resolver = test_resolver();

    let first = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let attrs = expect_success(&first);
    let tid = attrs.get("transmission_id").expect("transmission id").clone();
    assert_eq!(tid.len(), 8);

    // The recursor retries the identical name; the cache must replay
    let second = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    assert_eq!(
        expect_success(&second).get("transmission_id"),
        Some(&tid)
    );
    assert_eq!(first.answers, second.answers);
}

#[tokio::test(flavor = "multi_thread")]
async fn out_of_order_fragments_assemble_in_index_order() {
    let resolver = test_resolver();

    let begun = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let tid = expect_success(&begun)
        .get("transmission_id")
        .unwrap()
        .clone();

    for (data, index) in [("ccc", 2), ("aaa", 0), ("bbb", 1)] {
        let continued =
            resolver.resolve(&query(&format!("{data}.{index}.{tid}.continue.{ZONE}")));
        expect_success(&continued);
    }

    let ended = resolver.resolve(&query(&format!("3.{tid}.end.{ZONE}")));
    let attrs = expect_success(&ended);
    // The payload is not a session verb; the echo in the error proves the
    // session layer saw the fragments concatenated in index order
    assert_eq!(
        attrs.get("contents").map(String::as_str),
        Some("f-1-Message_type_aaabbbccc_is_unknown")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_continue_keeps_first_data() {
    let resolver = test_resolver();

    let begun = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let tid = expect_success(&begun)
        .get("transmission_id")
        .unwrap()
        .clone();

    expect_success(&resolver.resolve(&query(&format!("test.0.{tid}.continue.{ZONE}"))));
    // Same index, different data: first write wins
    expect_success(&resolver.resolve(&query(&format!("XXXX.0.{tid}.continue.{ZONE}"))));

    let ended = resolver.resolve(&query(&format!("1.{tid}.end.{ZONE}")));
    assert_eq!(
        expect_success(&ended).get("contents").map(String::as_str),
        Some("tset")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn end_with_missing_fragment_destroys_transmission() {
    let resolver = test_resolver();

    let begun = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let tid = expect_success(&begun)
        .get("transmission_id")
        .unwrap()
        .clone();

    expect_success(&resolver.resolve(&query(&format!("aaaa.0.{tid}.continue.{ZONE}"))));

    let ended = resolver.resolve(&query(&format!("2.{tid}.end.{ZONE}")));
    let attrs = expect_failure(&ended);
    assert!(attrs.get("error").unwrap().contains("length"));

    // The transmission is gone whatever the outcome
    let late = resolver.resolve(&query(&format!("bbbb.1.{tid}.continue.{ZONE}")));
    let attrs = expect_failure(&late);
    assert!(attrs.get("error").unwrap().contains("doesn't exist"));
}

#[tokio::test(flavor = "multi_thread")]
async fn session_echo_via_test_verb() {
    let resolver = test_resolver();

    let begun = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let tid = expect_success(&begun)
        .get("transmission_id")
        .unwrap()
        .clone();

    expect_success(&resolver.resolve(&query(&format!("test-hello.0.{tid}.continue.{ZONE}"))));
    let ended = resolver.resolve(&query(&format!("1.{tid}.end.{ZONE}")));
    assert_eq!(
        expect_success(&ended).get("contents").map(String::as_str),
        Some("olleh-tset")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn session_begins_through_the_full_stack() {
    let resolver = test_resolver();

    let begun = resolver.resolve(&query(&format!("x.begin.{ZONE}")));
    let tid = expect_success(&begun)
        .get("transmission_id")
        .unwrap()
        .clone();

    expect_success(&resolver.resolve(&query(&format!("b.0.{tid}.continue.{ZONE}"))));
    let ended = resolver.resolve(&query(&format!("1.{tid}.end.{ZONE}")));
    let contents = expect_success(&ended).get("contents").unwrap().clone();
    assert!(contents.starts_with("s-"));
    assert!(contents[2..].chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_in_zone_name_answers_with_success_attribute() {
    let resolver = test_resolver();

    let other = resolver.resolve(&query(&format!("www.{ZONE}")));
    let attrs = expect_failure(&other);
    assert_eq!(
        attrs.get("error").map(String::as_str),
        Some("This is not an API endpoint")
    );

    // $count counts the real attributes, not itself
    assert_eq!(attrs.get("$count").map(String::as_str), Some("2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_api_requests_fail_cleanly() {
    let resolver = test_resolver();

    // continue with too few labels
    let attrs = expect_failure(&resolver.resolve(&query(&format!("x.0.continue.{ZONE}"))));
    assert_eq!(
        attrs.get("error").map(String::as_str),
        Some("You used the API incorrectly.")
    );

    // end with a non-numeric length
    expect_failure(&resolver.resolve(&query(&format!("xyz.abcd1234.end.{ZONE}"))));

    // bare begin with no prefix label
    expect_failure(&resolver.resolve(&query(&format!("begin.{ZONE}"))));
}

#[tokio::test(flavor = "multi_thread")]
async fn off_zone_names_get_nxdomain() {
    let resolver = test_resolver();
    let response = resolver.resolve(&query("www.elsewhere.example"));
    assert_eq!(response.header.rcode, DNSRcode::NXDomain.as_u8());
    assert!(response.answers.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_records_short_circuit_the_api() {
    let mut fixed = FixedZone::new();
    fixed
        .load(&format!("$ORIGIN {ZONE}.\n$TTL 300\nwww A 192.0.2.80\n"))
        .expect("zone");
    let resolver = test_resolver_with(fixed);

    let response = resolver.resolve(&query(&format!("www.{ZONE}")));
    assert_eq!(response.header.rcode, DNSRcode::NoError.as_u8());
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].rtype, DNSResourceType::A);
    assert_eq!(response.answers[0].rdata, vec![192, 0, 2, 80]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_responses_replay_byte_for_byte() {
    let resolver = test_resolver();
    let name = format!("zzz.{ZONE}");

    let first = resolver.resolve(&query(&name));
    let second = resolver.resolve(&query(&name));
    assert_eq!(
        first.serialize().expect("serialize"),
        second.serialize().expect("serialize")
    );

    // Case-randomized retries hit the same entry
    let shouted = resolver.resolve(&query(&format!("ZZZ.{}", ZONE.to_uppercase())));
    assert_eq!(attributes(&first), attributes(&shouted));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_queries_are_refused() {
    let resolver = test_resolver();

    let mut update = query(&format!("x.{ZONE}"));
    update.header.opcode = 5;
    let response = resolver.resolve(&update);
    assert_eq!(response.header.rcode, DNSRcode::NotImp.as_u8());

    let mut empty = query(&format!("x.{ZONE}"));
    empty.questions.clear();
    empty.header.qdcount = 0;
    let response = resolver.resolve(&empty);
    assert_eq!(response.header.rcode, DNSRcode::FormErr.as_u8());
}
