use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-cases, strips accents and collapses whitespace runs to single spaces.
pub(crate) fn normalize_answer(value: &str) -> String {
    let stripped: String =
        value.nfd().filter(|ch| !is_combining_mark(*ch)).collect::<String>().to_lowercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn answers_match(student: &str, reference: &str) -> bool {
    let student = normalize_answer(student);
    !student.is_empty() && student == normalize_answer(reference)
}
