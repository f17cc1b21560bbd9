use abcibridge_frame::MessageKind;
use bytes::Bytes;

/// A message body plus the routing metadata needed to dispatch it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Connection the request arrived on. For responses, `Some` pins the
    /// reply to that connection; `None` goes to whichever peer is active.
    pub connection_id: Option<u64>,
    /// Application identity the message is addressed to.
    pub target: String,
    /// ABCI method, resolved from the body's leading field.
    pub kind: MessageKind,
    /// Serialized protobuf `Request` or `Response`.
    pub body: Bytes,
}

impl Envelope {
    /// Wrap a decoded request body.
    pub fn request(connection_id: u64, target: impl Into<String>, body: Bytes) -> Self {
        Self {
            connection_id: Some(connection_id),
            target: target.into(),
            kind: MessageKind::of_request(&body),
            body,
        }
    }

    /// A response for whichever peer is currently connected.
    pub fn response(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            connection_id: None,
            target: String::new(),
            kind: MessageKind::of_response(&body),
            body,
        }
    }

    /// A response bound to the connection this request arrived on.
    pub fn reply(&self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            connection_id: self.connection_id,
            target: self.target.clone(),
            kind: MessageKind::of_response(&body),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_classifies_body() {
        let env = Envelope::request(7, "app", Bytes::from_static(&[0x12, 0x00]));
        assert_eq!(env.kind, MessageKind::Flush);
        assert_eq!(env.connection_id, Some(7));
        assert_eq!(env.target, "app");
    }

    #[test]
    fn reply_inherits_routing() {
        let req = Envelope::request(3, "app", Bytes::from_static(&[0x5a, 0x00]));
        assert_eq!(req.kind, MessageKind::Commit);

        let resp = req.reply(Bytes::from_static(&[0x62, 0x00]));
        assert_eq!(resp.connection_id, Some(3));
        assert_eq!(resp.target, "app");
        assert_eq!(resp.kind, MessageKind::Commit);
    }

    #[test]
    fn unpinned_response() {
        let resp = Envelope::response(vec![0x1a, 0x00]);
        assert_eq!(resp.connection_id, None);
        assert_eq!(resp.kind, MessageKind::Flush);
    }
}
