//! Latin to Cyrillic transliteration for the Russian voice models.
//!
//! Generated posts often mix in Latin words (names, brands). The voice models
//! only read Cyrillic, so those words are spelled out phonetically first.

/// Multi-letter sequences, longest first so `shch` wins over `sh`.
const DIGRAPHS: &[(&str, &str)] = &[
    ("shch", "щ"),
    ("sh", "ш"),
    ("ch", "ч"),
    ("zh", "ж"),
    ("kh", "х"),
    ("ts", "ц"),
    ("ya", "я"),
    ("yu", "ю"),
    ("yo", "ё"),
    ("ye", "е"),
    ("ph", "ф"),
    ("th", "т"),
];

fn single(c: char) -> Option<&'static str> {
    Some(match c {
        'a' => "а",
        'b' => "б",
        'c' => "к",
        'd' => "д",
        'e' => "е",
        'f' => "ф",
        'g' => "г",
        'h' => "х",
        'i' => "и",
        'j' => "дж",
        'k' => "к",
        'l' => "л",
        'm' => "м",
        'n' => "н",
        'o' => "о",
        'p' => "п",
        'q' => "к",
        'r' => "р",
        's' => "с",
        't' => "т",
        'u' => "у",
        'v' => "в",
        'w' => "в",
        'x' => "кс",
        'y' => "й",
        'z' => "з",
        _ => return None,
    })
}

/// Uppercase the first letter of `s`.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Transliterate Latin letters to Cyrillic. Everything else passes through.
pub fn to_cyrillic(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() * 2);
    let mut i = 0;

    'outer: while i < chars.len() {
        let c = chars[i];
        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }
        let upper = c.is_ascii_uppercase();

        for (latin, cyr) in DIGRAPHS {
            let n = latin.len();
            if i + n > chars.len() {
                continue;
            }
            let matches = chars[i..i + n]
                .iter()
                .zip(latin.chars())
                .all(|(a, b)| a.to_ascii_lowercase() == b);
            if matches {
                out.push_str(&if upper { capitalize(cyr) } else { cyr.to_string() });
                i += n;
                continue 'outer;
            }
        }

        match single(c.to_ascii_lowercase()) {
            Some(cyr) if upper => out.push_str(&capitalize(cyr)),
            Some(cyr) => out.push_str(cyr),
            None => out.push(c),
        }
        i += 1;
    }

    out
}
