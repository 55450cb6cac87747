/// Best-effort language guess used when the caller asks for `auto`.
///
/// Script ranges are tested in a fixed priority order and the first hit wins,
/// so mixed Kanji/Kana text reports `zh`. Anything without a matching script
/// is reported as `en`.
pub fn detect_language(text: &str) -> &'static str {
    for (code, matches) in SCRIPT_TABLE {
        if text.chars().any(matches) {
            return code;
        }
    }
    "en"
}

const SCRIPT_TABLE: [(&str, fn(char) -> bool); 4] = [
    ("zh", is_cjk_ideograph),
    ("ja", is_kana),
    ("ko", is_hangul),
    ("ru", is_cyrillic),
];

fn is_cjk_ideograph(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF)
}

fn is_kana(ch: char) -> bool {
    matches!(ch as u32, 0x3040..=0x309F | 0x30A0..=0x30FF)
}

fn is_hangul(ch: char) -> bool {
    matches!(ch as u32, 0xAC00..=0xD7AF)
}

fn is_cyrillic(ch: char) -> bool {
    matches!(ch as u32, 0x0400..=0x04FF)
}

/// Characters that are laid out without inter-word spaces.
pub fn is_cjk_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF
    )
}

pub fn is_auto(code: &str) -> bool {
    code.trim().eq_ignore_ascii_case("auto")
}

/// Lowercased base subtag: `zh-CN` and `zh_TW` both become `zh`.
pub fn base_code(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn display_name(code: &str) -> String {
    let base = base_code(code);
    let name = match base.as_str() {
        "en" => "English",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "ru" => "Russian",
        _ => return code.trim().to_string(),
    };
    name.to_string()
}

/// Baidu uses its own codes for a handful of languages.
pub fn baidu_code(code: &str) -> Option<&'static str> {
    if is_auto(code) {
        return Some("auto");
    }
    match base_code(code).as_str() {
        "zh" => Some("zh"),
        "en" => Some("en"),
        "ja" => Some("jp"),
        "ko" => Some("kor"),
        "fr" => Some("fra"),
        "de" => Some("de"),
        "es" => Some("spa"),
        "ru" => Some("ru"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_scripts_in_priority_order() {
        assert_eq!(detect_language("你好"), "zh");
        assert_eq!(detect_language("こんにちは"), "ja");
        assert_eq!(detect_language("カタカナ"), "ja");
        assert_eq!(detect_language("안녕하세요"), "ko");
        assert_eq!(detect_language("Привет"), "ru");
        assert_eq!(detect_language("Bonjour"), "en");
        assert_eq!(detect_language(""), "en");
        // Kanji outranks Kana.
        assert_eq!(detect_language("日本語です"), "zh");
    }

    #[test]
    fn maps_provider_codes() {
        assert_eq!(baidu_code("ja"), Some("jp"));
        assert_eq!(baidu_code("KO"), Some("kor"));
        assert_eq!(baidu_code("auto"), Some("auto"));
        assert_eq!(baidu_code("zh-CN"), Some("zh"));
        assert_eq!(baidu_code("pt"), None);
    }

    #[test]
    fn display_names_pass_unknown_codes_through() {
        assert_eq!(display_name("ja"), "Japanese");
        assert_eq!(display_name("pt-BR"), "pt-BR");
    }
}
