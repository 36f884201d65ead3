use crate::base::neterror::{ErrorKind, NetError};
use crate::ws::{HandshakeError, ProtocolError, State};

#[test]
fn test_net_error_codes() {
    assert_eq!(NetError::ConnectionRefused.as_i32(), -102);
    assert_eq!(NetError::ConnectionTimedOut.as_i32(), -118);
    assert_eq!(NetError::InvalidUrl.as_i32(), -300);

    let protocol = NetError::from(ProtocolError::ReservedBitsSet);
    assert_eq!(protocol.as_i32(), -145);

    let handshake = NetError::from(HandshakeError::BadStatus {
        status: 404,
        reason: "Not Found".into(),
    });
    assert_eq!(handshake.as_i32(), -173);
}

#[test]
fn test_error_kinds() {
    assert_eq!(NetError::NameNotResolved.kind(), ErrorKind::Connect);
    assert_eq!(NetError::ConnectionRefused.kind(), ErrorKind::Connect);
    assert_eq!(NetError::SslProtocolError.kind(), ErrorKind::Tls);
    assert_eq!(
        NetError::CertificateInvalid {
            host: "example.com".into(),
            reason: "self signed".into(),
        }
        .kind(),
        ErrorKind::Tls
    );
    assert_eq!(
        NetError::from(HandshakeError::MissingAccept).kind(),
        ErrorKind::Handshake
    );
    assert_eq!(
        NetError::from(ProtocolError::FragmentedControlFrame).kind(),
        ErrorKind::Protocol
    );
    assert_eq!(
        NetError::NotOpen {
            state: State::Closed
        }
        .kind(),
        ErrorKind::Send
    );
}

#[test]
fn test_error_display_carries_detail() {
    let err = NetError::from(ProtocolError::ControlFrameTooLarge(126));
    let msg = err.to_string();
    assert!(msg.contains("126"), "unexpected message: {msg}");
}
