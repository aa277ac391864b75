#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use gazette_transport::{
    SendOutcome, SmtpConfig, SmtpTimeouts, SmtpTransport, Transport, TransportError,
};
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn transport_for(server: &MockSmtpServer) -> SmtpTransport {
    SmtpTransport::new(SmtpConfig {
        host: "127.0.0.1".to_string(),
        port: server.addr().port(),
        from: "news@example.com".to_string(),
        starttls: false,
        helo_name: "gazette.test".to_string(),
        ..SmtpConfig::default()
    })
}

#[tokio::test]
async fn test_accepted_message_walks_the_full_session() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = transport_for(&server);

    let outcome = transport
        .send("reader@example.org", "Newsletter: Rust", "Hello readers")
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Accepted);

    let commands = server.commands().await;
    assert_eq!(commands[0], SmtpCommand::Ehlo("gazette.test".to_string()));
    assert_eq!(commands[1], SmtpCommand::MailFrom("FROM:<news@example.com>".to_string()));
    assert_eq!(commands[2], SmtpCommand::RcptTo("reader@example.org".to_string()));
    assert_eq!(commands[3], SmtpCommand::Data);
    assert_eq!(commands.last(), Some(&SmtpCommand::Quit));

    let messages = server.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Subject: Newsletter: Rust\r\n"));
    assert!(messages[0].ends_with("\r\n\r\nHello readers\r\n"));

    server.shutdown();
}

#[tokio::test]
async fn test_recipient_refusal_is_rejection_not_fault() {
    let server = MockSmtpServer::builder()
        .with_rcpt_response_for("ghost@example.org", 550, "5.1.1 User unknown")
        .build()
        .await
        .unwrap();
    let transport = transport_for(&server);

    let refused = transport
        .send("ghost@example.org", "s", "b")
        .await
        .unwrap();
    assert_eq!(
        refused,
        SendOutcome::rejected(Some(550), "5.1.1 User unknown")
    );

    let fine = transport.send("reader@example.org", "s", "b").await.unwrap();
    assert!(fine.is_accepted());

    server.shutdown();
}

#[tokio::test]
async fn test_transient_refusal_keeps_its_code() {
    let server = MockSmtpServer::builder()
        .with_data_end_response(451, "Try again later")
        .build()
        .await
        .unwrap();

    let outcome = transport_for(&server)
        .send("reader@example.org", "s", "b")
        .await
        .unwrap();
    assert!(matches!(outcome, SendOutcome::Rejected { code: Some(451), .. }));

    server.shutdown();
}

#[tokio::test]
async fn test_connection_refused_is_fault() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = SmtpTransport::new(SmtpConfig {
        host: "127.0.0.1".to_string(),
        port,
        from: "news@example.com".to_string(),
        starttls: false,
        ..SmtpConfig::default()
    });

    assert!(matches!(
        transport.send("reader@example.org", "s", "b").await,
        Err(TransportError::Connection(_))
    ));
}

#[tokio::test]
async fn test_dropped_connection_is_fault() {
    let server = MockSmtpServer::builder()
        .with_network_error_after_commands(2)
        .build()
        .await
        .unwrap();

    assert!(matches!(
        transport_for(&server).send("reader@example.org", "s", "b").await,
        Err(TransportError::Connection(_))
    ));

    server.shutdown();
}

#[tokio::test]
async fn test_slow_relay_times_out() {
    let server = MockSmtpServer::builder()
        .with_response_delay(Duration::from_secs(3))
        .build()
        .await
        .unwrap();

    let transport = SmtpTransport::new(SmtpConfig {
        timeouts: SmtpTimeouts {
            ehlo_secs: 1,
            ..SmtpTimeouts::default()
        },
        ..transport_for(&server).config().clone()
    });

    let result = transport.send("reader@example.org", "s", "b").await;
    assert!(
        matches!(&result, Err(TransportError::Timeout(phase)) if phase.starts_with("EHLO")),
        "{result:?}"
    );

    server.shutdown();
}

#[tokio::test]
async fn test_auth_plain_credentials() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = SmtpTransport::new(SmtpConfig {
        username: Some("user".to_string()),
        password: Some("secret".to_string()),
        ..transport_for(&server).config().clone()
    });

    transport.send("reader@example.org", "s", "b").await.unwrap();

    let expected = format!("PLAIN {}", STANDARD.encode("\0user\0secret"));
    assert!(server.commands().await.contains(&SmtpCommand::Auth(expected)));

    server.shutdown();
}

#[tokio::test]
async fn test_bad_credentials_are_rejected() {
    let server = MockSmtpServer::builder()
        .with_auth_response(535, "Authentication credentials invalid")
        .build()
        .await
        .unwrap();
    let transport = SmtpTransport::new(SmtpConfig {
        username: Some("user".to_string()),
        password: Some("wrong".to_string()),
        ..transport_for(&server).config().clone()
    });

    let outcome = transport.send("reader@example.org", "s", "b").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Rejected { code: Some(535), .. }));
    assert!(
        !server
            .commands()
            .await
            .iter()
            .any(|c| matches!(c, SmtpCommand::MailFrom(_)))
    );

    server.shutdown();
}

#[tokio::test]
async fn test_leading_dots_are_stuffed() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    transport_for(&server)
        .send("reader@example.org", "s", "line one\n.hidden\nend")
        .await
        .unwrap();

    let message = &server.messages().await[0];
    assert!(message.contains("\r\nline one\r\n..hidden\r\nend\r\n"));

    server.shutdown();
}

#[tokio::test]
async fn test_starttls_required_but_not_offered() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let transport = SmtpTransport::new(SmtpConfig {
        starttls: true,
        ..transport_for(&server).config().clone()
    });

    assert!(matches!(
        transport.send("reader@example.org", "s", "b").await,
        Err(TransportError::Tls(_))
    ));
    assert!(!server.commands().await.contains(&SmtpCommand::StartTls));

    server.shutdown();
}

#[tokio::test]
async fn test_starttls_refused_is_tls_fault() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.relay", "STARTTLS"])
        .build()
        .await
        .unwrap();
    let transport = SmtpTransport::new(SmtpConfig {
        starttls: true,
        ..transport_for(&server).config().clone()
    });

    assert!(matches!(
        transport.send("reader@example.org", "s", "b").await,
        Err(TransportError::Tls(_))
    ));
    assert!(server.commands().await.contains(&SmtpCommand::StartTls));

    server.shutdown();
}
