//! Incremental decoding of response bodies into `responseText`

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

pub(crate) enum BodyDecoder {
    /// Decodes with the declared charset, a byte order mark takes precedence
    Text(Decoder),
    /// Each byte becomes the char with the same code point
    Binary,
}

impl BodyDecoder {
    pub(crate) fn new(content_type: Option<&str>, binary: bool) -> Self {
        if binary {
            return BodyDecoder::Binary;
        }
        let encoding = content_type
            .and_then(charset_from_content_type)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8);
        BodyDecoder::Text(encoding.new_decoder())
    }

    pub(crate) fn decode(&mut self, bytes: &[u8], out: &mut String) {
        match self {
            BodyDecoder::Text(decoder) => feed(decoder, bytes, out, false),
            BodyDecoder::Binary => out.extend(bytes.iter().map(|&b| char::from(b))),
        }
    }

    /// Flushes bytes held back at a chunk boundary
    pub(crate) fn finish(&mut self, out: &mut String) {
        if let BodyDecoder::Text(decoder) = self {
            feed(decoder, &[], out, true);
        }
    }
}

fn feed(decoder: &mut Decoder, mut src: &[u8], out: &mut String, last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len().saturating_mul(3).saturating_add(16));
        out.reserve(needed);

        let (result, read, _) = decoder.decode_to_string(src, out, last);
        src = &src[read..];
        if matches!(result, CoderResult::InputEmpty) {
            return;
        }
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'');
        (!label.is_empty()).then(|| label.to_owned())
    })
}
