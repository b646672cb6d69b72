// Document statistics for progress reporting

/// Rough print density of a generated contract.
pub const WORDS_PER_PAGE: usize = 500;

/// Text a reader would see: tags removed, common entities decoded.
pub fn visible_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(c) = rest.chars().next() {
        match c {
            '<' => match rest.find('>') {
                Some(end) => {
                    // Treat every tag as a word break
                    text.push(' ');
                    rest = &rest[end + 1..];
                }
                None => break,
            },
            '&' => {
                let decoded = rest.find(';').and_then(|end| {
                    decode_entity(&rest[1..end]).map(|d| (d, end + 1))
                });
                if let Some((d, len)) = decoded {
                    text.push(d);
                    rest = &rest[len..];
                } else {
                    text.push('&');
                    rest = &rest[1..];
                }
            }
            _ => {
                text.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    text
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        "sect" => Some('§'),
        "copy" => Some('©'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

pub fn word_count(html: &str) -> usize {
    visible_text(html).split_whitespace().count()
}

pub const fn estimated_pages(words: usize) -> usize {
    words.div_ceil(WORDS_PER_PAGE)
}

/// Percentage of the requested page count reached so far.
#[allow(clippy::cast_precision_loss)]
pub fn page_progress(pages: usize, target_pages: u32) -> f64 {
    if target_pages == 0 {
        return 0.0;
    }
    (pages as f64 / f64::from(target_pages)) * 100.0
}
