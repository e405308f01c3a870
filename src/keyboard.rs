use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// 2×2 answer keyboard. Labels are the 1-based option numbers shown in the
/// question text; callback data carries the 0-based index.
pub(crate) fn answers_keyboard() -> InlineKeyboardMarkup {
    let keyboard = vec![
        vec![
            InlineKeyboardButton::callback("1", "0"),
            InlineKeyboardButton::callback("2", "1"),
        ],
        vec![
            InlineKeyboardButton::callback("3", "2"),
            InlineKeyboardButton::callback("4", "3"),
        ],
    ];

    InlineKeyboardMarkup::new(keyboard)
}
