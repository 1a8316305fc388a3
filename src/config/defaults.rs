//! Default values and limits shared by parsing and validation.

pub const DEFAULT_BACKEND_CMD: &str = "dreamd";
pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_SOFT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SPEECH_MAX_CHARS: usize = 200;
pub const DEFAULT_FEATURES: &str = "voice,dataviz,dbquery";

/// First transcript line of a fresh session.
pub const DEFAULT_GREETING: &str =
    "Welcome to DreamOS. Type /init to start a session, /help for commands.";

pub const MIN_SOFT_TIMEOUT_SECS: u64 = 1;
pub const MAX_SOFT_TIMEOUT_SECS: u64 = 600;
pub const MIN_SPEECH_MAX_CHARS: usize = 20;
pub const MAX_SPEECH_MAX_CHARS: usize = 2000;

/// Caps for arguments forwarded to the backend subprocess.
pub(super) const MAX_BACKEND_ARGS: usize = 64;
pub(super) const MAX_BACKEND_ARG_BYTES: usize = 8192;

pub(super) const MAX_VOICE_NAME_CHARS: usize = 64;

/// Characters never allowed in voice names or similar pass-through values.
pub(super) const FORBIDDEN_VALUE_CHARS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '"', '\'', '\\', '\n', '\r', '\0',
];

/// ISO 639-1 two-letter language codes, for locale validation.
pub(super) const ISO_639_1_CODES: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg",
    "bh", "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv",
    "cy", "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi",
    "fj", "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr",
    "ht", "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
];
