//! Trust-manager lifecycle: bundle reloads swap the outbound transport
//! exactly once per content change, and never while a batch is in flight.

use std::time::Duration;

use clap::Parser;

use shepherd::config::Settings;
use shepherd::AppState;

const CA1: &str = "-----BEGIN CERTIFICATE-----
MIIDCzCCAfOgAwIBAgIUMCmGKeHgMypCPziD+mh/dq7c+HEwDQYJKoZIhvcNAQEL
BQAwFTETMBEGA1UEAwwKZmxlZXQtY2EtMTAeFw0yNjA4MDEwNjQ1MjlaFw0zNjA3
MjkwNjQ1MjlaMBUxEzARBgNVBAMMCmZsZWV0LWNhLTEwggEiMA0GCSqGSIb3DQEB
AQUAA4IBDwAwggEKAoIBAQCZvUNdfan1zpy5WA7nzrZWved89PF7eeGZG4j6soMF
Y3mu8yumqatsmZb/+SQr/DshnC0FVqb68ZmXDBPdYotWw4pfjoiploJQOzO8q5oI
FmcKdUa6MuhovKwcSKT45jugtbvh31dkRxk4V95R5QLJ85y2dd0qEYUwQ4YlDAQe
HaTx70q5z8VSy6picu7xTmxc2QKniU80ZMG3uRuy+z3dz9+1tSce9zB/K4cqD+bJ
ndc3kkoDe1Ba4FiQKSmTF6j6Xc7N0uBAdRu/xA2c4WiRvAFK5KjxYFmz25GqXjM5
Qr2pADh6sC0INB2to96FIKKL/dCN9O7wZ/mWTzTiBnerAgMBAAGjUzBRMB0GA1Ud
DgQWBBTb+vxR7YYFmSXYvKSmsUDrdC4zEzAfBgNVHSMEGDAWgBTb+vxR7YYFmSXY
vKSmsUDrdC4zEzAPBgNVHRMBAf8EBTADAQH/MA0GCSqGSIb3DQEBCwUAA4IBAQBe
Ku647Rvnix5n7ibeeLptrj8Y8BaxRCoRe6v1lP3D/Dh856CzxWa2tGdaxReWkx/u
7ljbTOc+lUQsYSemNYZjs3Q3gMaj+gTq2qP4NMz9qOzRfhiIhKWIwxRU8qRlxVPQ
hjZfzbUhmYbNommdCkY09pibqW/8+Wa4R6qSWwykmpaFIrIksrjkannhPfJPzCDF
r7aWlj2Jn/VJL0N31gg5Ih2oSwYj87ZUI+HRvWWp12uC3puKZQazwczMbubsZisW
PSR/BZah9vgIxcjgLTzvsjGpPDJxI8K/QrADkWEPEhvSSnZ2OJd18JBC9bHFTglz
ykec6FdRhjH9S1cQ0xd4
-----END CERTIFICATE-----
";

const CA2: &str = "-----BEGIN CERTIFICATE-----
MIIDCzCCAfOgAwIBAgIUB7n4OYk8cOOejvNnww3Rr6UtAigwDQYJKoZIhvcNAQEL
BQAwFTETMBEGA1UEAwwKZmxlZXQtY2EtMjAeFw0yNjA4MDEwNjQ1MjlaFw0zNjA3
MjkwNjQ1MjlaMBUxEzARBgNVBAMMCmZsZWV0LWNhLTIwggEiMA0GCSqGSIb3DQEB
AQUAA4IBDwAwggEKAoIBAQD8ZSpSpfO/5yTO4jMVp6ywK9LnNCsx7Ws8NZ7DYnTF
3I7PkhfScMZmYhWtr90SKDnXLooHCEUQSQricb4QBqHVdI6MEAVQQ/UCa/qmd9FS
6CiJF5dhJga5wTGich85iAz+op/m/0qmyKmikfa5c99kUZGxRBFfj0ARgs/22rNP
k1avb2NAv+8DVdpmGheTKd1PgmWxEy96Bqf/GgOzk3tWezDYX+v7p7kYEi0B82Th
vpjYr6HnnHJlkG/mtrw9r9W/CqJ0iAAITqM3+fis2r+mFXEAZ7muhMfFPhRNXQ3E
3Acup7ZqlG6ZIKONlFqyG+fvbPCC5etKmbRuetC3/oK3AgMBAAGjUzBRMB0GA1Ud
DgQWBBQHy31y0K+kPifZsn9mF+SCt2BdeDAfBgNVHSMEGDAWgBQHy31y0K+kPifZ
sn9mF+SCt2BdeDAPBgNVHRMBAf8EBTADAQH/MA0GCSqGSIb3DQEBCwUAA4IBAQB5
meI3MpVInJISQLwrGb5I5D5COvE9qU4S6LMbDaGuuoV4bYJGrEfKBU54oo558JYk
tg9L9AITlPy6wV2TrQDG1+EMBT7feEtLEP72FyWbZ1R4aVuQ26WYsruWV2oHBrc4
WdtD87GlvAgzUAs29IcncL4KhZJLRQweKBGe8sgNNCq/T6vY/HcjNAmaS1KpWYV7
tra9gGn+ga1ye9DHZ+CEHNdqRkqehTfK9FR3UQ6csBU5llIJxs1BaYjG5mS6dszF
jmbFlM2uC7VK/9aG/e1lGfQ4hF9BHFHMuLEW0QFKt7AJmKbeixdhV046ic3lRbWi
BU8BJ3kAuyvHgpMNukW0
-----END CERTIFICATE-----
";

fn state_with_bundle(path: &std::path::Path) -> AppState {
    let settings = Settings::try_parse_from([
        "shepherd",
        "--ca-uri",
        path.to_str().unwrap(),
        "--default-http",
        "true",
    ])
    .unwrap();
    AppState::new(settings).unwrap()
}

#[tokio::test]
async fn swaps_once_per_content_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.pem");
    std::fs::write(&path, CA1).unwrap();

    let state = state_with_bundle(&path);
    let trust = state.trust.clone();
    assert_eq!(trust.update_count(), 0);

    trust.rebuild().await.unwrap();
    assert_eq!(trust.update_count(), 1);

    // unchanged content: polling does not swap
    assert!(!trust.check_once().await.unwrap());
    assert_eq!(trust.update_count(), 1);

    // rewritten bundle (now a two-cert chain): exactly one more swap
    std::fs::write(&path, format!("{}{}", CA1, CA2)).unwrap();
    assert!(trust.check_once().await.unwrap());
    assert_eq!(trust.update_count(), 2);
    assert!(!trust.check_once().await.unwrap());
    assert_eq!(trust.update_count(), 2);
}

#[tokio::test]
async fn swap_waits_for_inflight_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.pem");
    std::fs::write(&path, CA1).unwrap();

    let state = state_with_bundle(&path);
    let trust = state.trust.clone();
    trust.rebuild().await.unwrap();
    assert_eq!(trust.update_count(), 1);

    std::fs::write(&path, CA2).unwrap();

    // a batch is in flight: the swap must queue behind it
    let guard = state.engine.lock_batches().await;
    let swapper = {
        let trust = trust.clone();
        tokio::spawn(async move { trust.check_once().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(trust.update_count(), 1);

    drop(guard);
    let changed = tokio::time::timeout(Duration::from_secs(5), swapper)
        .await
        .unwrap()
        .unwrap();
    assert!(changed);
    assert_eq!(trust.update_count(), 2);
}
