//! Decides whether a received buffer is a plaintext HTTP request or an
//! opaque payload (typically TLS records inside an established tunnel).

/// Method tokens that mark a buffer as HTTP. Each includes its trailing space.
pub const METHOD_TOKENS: [&str; 9] = [
    "GET ", "HEAD ", "POST ", "PUT ", "DELETE ", "CONNECT ", "OPTIONS ", "TRACE ", "PATCH ",
];

/// True when the buffer's text contains any recognised method token.
///
/// This is a substring heuristic, not a request-line parser: the token may
/// appear anywhere in the first read. Non-UTF-8 bytes are replaced before
/// matching so binary payloads never match by accident of decoding.
pub fn is_http_request(buffer: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buffer);
    METHOD_TOKENS.iter().any(|token| text.contains(token))
}

/// True when the request line's method is CONNECT.
pub fn is_connect_request(text: &str) -> bool {
    text.trim_start().starts_with("CONNECT ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_get_is_http() {
        assert!(is_http_request(b"GET / HTTP/1.1\r\n"));
        assert!(is_http_request(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n"));
    }

    #[test]
    fn test_tls_client_hello_is_opaque() {
        let hello: [u8; 16] = [
            0x16, 0x03, 0x01, 0x02, 0x00, 0x01, 0x00, 0x01, 0xfc, 0x03, 0x03, 0x9a, 0xe2, 0x41,
            0xd7, 0x8f,
        ];
        assert!(!is_http_request(&hello));
    }

    #[test]
    fn test_patch_token_recognised() {
        assert!(is_http_request(b"PATCH /items/1 HTTP/1.1\r\nHost: a.test\r\n\r\n"));
        assert!(!is_http_request(b"PATH /items/1"));
    }

    #[test]
    fn test_method_without_space_is_opaque() {
        assert!(!is_http_request(b"GETTING"));
        assert!(!is_http_request(b""));
    }

    #[test]
    fn test_connect_detection_uses_method() {
        assert!(is_connect_request("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(!is_connect_request("GET /CONNECT HTTP/1.1\r\nHost: a.test\r\n\r\n"));
    }
}
