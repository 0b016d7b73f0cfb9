//! ANSI virtual key codes <-> key names

#[rustfmt::skip]
const KEYS: &[(u16, &str)] = &[
    // Letters
    (0, "a"), (1, "s"), (2, "d"), (3, "f"), (4, "h"), (5, "g"), (6, "z"), (7, "x"),
    (8, "c"), (9, "v"), (11, "b"), (12, "q"), (13, "w"), (14, "e"), (15, "r"),
    (16, "y"), (17, "t"), (31, "o"), (32, "u"), (34, "i"), (35, "p"), (37, "l"),
    (38, "j"), (40, "k"), (45, "n"), (46, "m"),
    // Numbers
    (18, "1"), (19, "2"), (20, "3"), (21, "4"), (22, "6"), (23, "5"), (25, "9"),
    (26, "7"), (28, "8"), (29, "0"),
    // Punctuation
    (24, "="), (27, "-"), (30, "]"), (33, "["), (39, "'"), (41, ";"), (42, "\\"),
    (43, ","), (44, "/"), (47, "."), (50, "`"),
    // Whitespace and editing
    (36, "enter"), (48, "tab"), (49, "space"), (51, "backspace"), (53, "esc"),
    (117, "delete"),
    // Modifiers
    (55, "cmd"), (56, "shift"), (57, "caps lock"), (58, "alt"), (59, "ctrl"),
    (60, "right shift"), (61, "right alt"), (62, "right ctrl"), (63, "fn"),
    // Navigation
    (123, "left"), (124, "right"), (125, "down"), (126, "up"), (115, "home"),
    (119, "end"), (116, "page up"), (121, "page down"),
    // Function keys
    (122, "f1"), (120, "f2"), (99, "f3"), (118, "f4"), (96, "f5"), (97, "f6"),
    (98, "f7"), (100, "f8"), (101, "f9"), (109, "f10"), (103, "f11"), (111, "f12"),
];

pub fn name_for(code: u16) -> String {
    KEYS.iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| n.to_string())
        .unwrap_or_else(|| format!("keycode {}", code))
}

pub fn code_for(name: &str) -> Option<u16> {
    if let Some(raw) = name.strip_prefix("keycode ") {
        return raw.parse().ok();
    }
    KEYS.iter().find(|(_, n)| *n == name).map(|(c, _)| *c)
}
