/// Status lines the proxy synthesizes itself. Every reply carries an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReply {
    Ok,
    Forbidden,
    BadGateway,
}

impl StatusReply {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            StatusReply::Ok => b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
            StatusReply::Forbidden => b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n",
            StatusReply::BadGateway => b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n",
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            StatusReply::Ok => 200,
            StatusReply::Forbidden => 403,
            StatusReply::BadGateway => 502,
        }
    }
}

impl std::fmt::Display for StatusReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusReply::Ok => write!(f, "200 OK"),
            StatusReply::Forbidden => write!(f, "403 Forbidden"),
            StatusReply::BadGateway => write!(f, "502 Bad Gateway"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            StatusReply::Ok.as_bytes(),
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n"
        );
        assert_eq!(
            StatusReply::Forbidden.as_bytes(),
            b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n"
        );
        assert_eq!(
            StatusReply::BadGateway.as_bytes(),
            b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_status_line_matches_code() {
        for reply in [StatusReply::Ok, StatusReply::Forbidden, StatusReply::BadGateway] {
            let text = std::str::from_utf8(reply.as_bytes()).unwrap();
            assert!(text.starts_with(&format!("HTTP/1.1 {}\r\n", reply)));
            assert!(reply.to_string().starts_with(&reply.code().to_string()));
        }
    }
}
