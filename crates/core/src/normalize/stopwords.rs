//! Compiled-in stopword sets.
//!
//! One modest, high-frequency set per supported language. Lookups happen on
//! already-normalized (lowercased, NFKC) tokens, so every entry here must be
//! lowercase and NFKC itself.

/// Returns the stopword set for a two-letter language code, or `None` when the
/// language has no compiled set (callers skip removal, never fail).
pub fn stopwords_for(lang: &str) -> Option<&'static [&'static str]> {
    match lang {
        "en" => Some(ENGLISH),
        "es" => Some(SPANISH),
        "fr" => Some(FRENCH),
        "de" => Some(GERMAN),
        "pt" => Some(PORTUGUESE),
        "it" => Some(ITALIAN),
        "nl" => Some(DUTCH),
        "ru" => Some(RUSSIAN),
        "zh" => Some(CHINESE),
        "ja" => Some(JAPANESE),
        "ko" => Some(KOREAN),
        _ => None,
    }
}

static ENGLISH: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had", "has",
    "have", "he", "her", "his", "in", "is", "it", "its", "of", "on", "or", "she", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "was", "we", "were", "which",
    "who", "will", "with", "would", "you",
];

static SPANISH: &[&str] = &[
    "al", "como", "con", "de", "del", "el", "ella", "en", "entre", "es", "esta", "este", "esto",
    "fue", "ha", "han", "la", "las", "lo", "los", "mas", "muy", "no", "o", "para", "pero", "por",
    "que", "se", "ser", "si", "sin", "sobre", "son", "su", "sus", "también", "un", "una", "uno",
    "y", "ya",
];

static FRENCH: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "elle", "en", "est", "et", "il",
    "ils", "la", "le", "les", "leur", "mais", "ne", "ni", "nous", "on", "ou", "par", "pas", "pour",
    "qui", "que", "sa", "se", "ses", "son", "sont", "sur", "un", "une", "vous",
];

static GERMAN: &[&str] = &[
    "aber", "als", "auch", "auf", "aus", "bei", "das", "dass", "dem", "den", "der", "des", "die",
    "durch", "ein", "eine", "einen", "einer", "es", "für", "hat", "im", "in", "ist", "mit",
    "nach", "nicht", "noch", "oder", "sich", "sie", "sind", "über", "und", "von", "vor", "war",
    "werden", "wie", "wird", "zu", "zum", "zur",
];

static PORTUGUESE: &[&str] = &[
    "a", "ao", "as", "com", "como", "da", "das", "de", "do", "dos", "e", "em", "entre", "foi",
    "há", "isso", "mais", "mas", "na", "nas", "no", "nos", "não", "o", "os", "ou", "para",
    "pela", "pelo", "por", "que", "se", "sem", "ser", "seu", "sua", "são", "também", "um", "uma",
];

static ITALIAN: &[&str] = &[
    "a", "al", "alla", "anche", "che", "chi", "ci", "come", "con", "da", "dal", "degli", "dei",
    "del", "della", "di", "e", "ed", "è", "fra", "gli", "ha", "hanno", "i", "il", "in", "la",
    "le", "lo", "ma", "nel", "nella", "non", "o", "per", "più", "se", "si", "sono", "su", "tra",
    "un", "una", "uno",
];

static DUTCH: &[&str] = &[
    "aan", "als", "bij", "dat", "de", "den", "der", "deze", "die", "dit", "door", "een", "en",
    "er", "het", "hij", "in", "is", "maar", "met", "naar", "niet", "of", "om", "onder", "ook",
    "op", "over", "te", "tot", "uit", "van", "voor", "wat", "wordt", "zijn", "zij",
];

static RUSSIAN: &[&str] = &[
    "а", "без", "более", "бы", "был", "была", "были", "было", "в", "вот", "все", "всех", "вы",
    "да", "для", "до", "его", "ее", "если", "есть", "еще", "же", "за", "и", "из", "или", "их",
    "к", "как", "ко", "когда", "мы", "на", "не", "него", "нет", "ни", "но", "о", "об", "он",
    "она", "они", "от", "по", "при", "с", "со", "так", "также", "то", "только", "у", "уже",
    "что", "это", "этот",
];

// CJK sets match only where particles stand alone after punctuation folding;
// no word segmentation is attempted.
static CHINESE: &[&str] = &[
    "的", "了", "和", "是", "在", "我", "有", "他", "这", "中", "大", "来", "上", "国", "个",
    "到", "说", "们", "为", "子", "与", "也", "而", "就", "于", "对", "及",
];

static JAPANESE: &[&str] = &[
    "の", "に", "は", "を", "た", "が", "で", "て", "と", "し", "れ", "さ", "ある", "いる",
    "も", "する", "から", "な", "こと", "として", "や", "など", "まで", "それ", "これ",
];

static KOREAN: &[&str] = &[
    "이", "그", "저", "것", "수", "들", "및", "에서", "으로", "를", "을", "은", "는", "가",
    "에", "와", "과", "도", "의", "하다", "있다", "되다", "한", "하는", "있는",
];
