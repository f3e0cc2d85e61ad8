mod common;

use common::Stub;
use fetchkit_http::{ClientDefaults, HttpClient, IpVersion};

// Global defaults are process-wide, so everything touching them lives in a
// single test.
#[test]
fn global_defaults_apply_to_new_clients() {
    let stub = Stub::respond(200, "");

    let mut before = HttpClient::new();
    before.set_transport(stub.clone());

    HttpClient::only_ipv4();
    ClientDefaults::update_global(|d| {
        d.headers.insert("X-Env".into(), vec!["staging".into()]);
        d.user_agent = Some("agent-test/2".into());
    });

    let mut after = HttpClient::new();
    after.set_transport(stub.clone());

    before.get("https://example.test/", ()).unwrap();
    let request = stub.last();
    assert_eq!(request.options.ip_version, Some(IpVersion::Any));
    assert!(request.header("x-env").is_none());

    after.get("https://example.test/", ()).unwrap();
    let request = stub.last();
    assert_eq!(request.options.ip_version, Some(IpVersion::V4));
    assert_eq!(request.header("x-env").unwrap(), "staging");
    assert_eq!(request.header("user-agent").unwrap(), "agent-test/2");

    HttpClient::only_ipv6();
    assert_eq!(ClientDefaults::global().ip_version, IpVersion::V6);

    ClientDefaults::set_global(ClientDefaults::default());
    assert_eq!(ClientDefaults::global(), ClientDefaults::default());
}
