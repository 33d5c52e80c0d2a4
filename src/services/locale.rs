// Locale mapping between site locales (language only) and ERP/search locales (language + dialect)

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub static LOCALES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("en", "en_US"),
        ("de", "de_DE"),
        ("fr", "fr_FR"),
        ("bg", "bg_BG"),
        ("cs", "cs_CZ"),
        ("da", "da_DK"),
        ("el", "el_GR"),
        ("es", "es_ES"),
        ("ca", "it_IT"),
        ("fa-IR", "fa_IR"),
        ("fi-FI", "fi_FI"),
        ("it", "it_IT"),
        ("ja-JP", "ja_JP"),
        ("lt", "lt_LT"),
        ("nl", "nl_NL"),
        ("pl-PL", "pl_PL"),
        ("pt", "pt_PT"),
        ("pt-BR", "it_IT"),
        ("ru", "ru_RU"),
        ("sv", "sv_SE"),
        ("uk", "uk_UA"),
        ("zh-CN", "zh_CN"),
        ("et", "et_EE"),
        ("hr", "hr_HR"),
        ("nb", "nb_NO"),
        ("sk", "sk_SK"),
        ("sl", "sl_SL"),
        ("sr", "sr_RS"),
    ])
});

/// ERP locale for a site locale, if the locale is mapped
pub fn erp_locale(locale: &str) -> Option<&'static str> {
    LOCALES.get(locale).copied()
}
