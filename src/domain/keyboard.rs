//! # Inline Keyboards
//!
//! Button rows attached to outgoing messages, and the pagination row builder.

use crate::domain::route::{CallbackParams, encode_callback_payload};
use crate::strings::messages;

/// A callback button: pressing it sends `data` back as a callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

impl Button {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineKeyboard {
    rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single button on its own row.
    pub fn button(mut self, button: Button) -> Self {
        self.rows.push(vec![button]);
        self
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn rows(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.rows.extend(rows.into_iter().filter(|r| !r.is_empty()));
        self
    }

    pub fn prepend_row(&mut self, row: Vec<Button>) {
        if !row.is_empty() {
            self.rows.insert(0, row);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn as_rows(&self) -> &[Vec<Button>] {
        &self.rows
    }
}

/// Builds pagination rows for a listing.
///
/// Produces a prev/next row, a row of at most eight page numbers with the current page
/// marked, and a first/last row once there are more than eight pages. Every button carries
/// `action[<params>&page=N]`. Returns nothing when everything fits on one page.
pub fn paginate(
    action: &str,
    params: &CallbackParams,
    current_page: u32,
    total_records: u32,
    per_page: u32,
) -> Vec<Vec<Button>> {
    let per_page = per_page.max(1);
    let last_page = total_records.div_ceil(per_page);
    if last_page <= 1 {
        return Vec::new();
    }

    let page_data = |page: u32| {
        let mut query = params.clone();
        query.set("page", page.to_string());
        encode_callback_payload(action, &query)
    };

    let mut layout = Vec::new();

    let mut nav = Vec::new();
    if current_page > 1 {
        nav.push(Button::callback(messages::PAGE_PREV, page_data(current_page - 1)));
    }
    if current_page < last_page {
        nav.push(Button::callback(messages::PAGE_NEXT, page_data(current_page + 1)));
    }
    if !nav.is_empty() {
        layout.push(nav);
    }

    let (start, end) = if last_page > 8 {
        if current_page < 8 {
            (1, 8)
        } else {
            (current_page - 3, current_page + 4)
        }
    } else {
        (1, last_page)
    };

    let numbers: Vec<Button> = (start..=end.min(last_page))
        .take(8)
        .map(|page| {
            let label = if page == current_page {
                format!("\u{2714} {page}")
            } else {
                page.to_string()
            };
            Button::callback(label, page_data(page))
        })
        .collect();
    layout.push(numbers);

    if current_page > 1 && last_page > 8 {
        let mut edges = vec![Button::callback(messages::PAGE_FIRST, page_data(1))];
        if current_page < last_page {
            edges.push(Button::callback(messages::PAGE_LAST, page_data(last_page)));
        }
        layout.push(edges);
    }

    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_page_has_no_buttons() {
        assert!(paginate("list.show", &CallbackParams::new(), 1, 5, 10).is_empty());
        assert!(paginate("list.show", &CallbackParams::new(), 1, 0, 10).is_empty());
    }

    #[test]
    fn test_small_listing() {
        let rows = paginate("list.show", &CallbackParams::new(), 2, 30, 10);
        assert_eq!(rows.len(), 2);
        let nav: Vec<&str> = rows[0].iter().map(|b| b.data.as_str()).collect();
        assert_eq!(nav, vec!["list.show[page=1]", "list.show[page=3]"]);
        let labels: Vec<&str> = rows[1].iter().map(|b| b.text.as_str()).collect();
        assert_eq!(labels, vec!["1", "\u{2714} 2", "3"]);
    }

    #[test]
    fn test_large_listing_window_and_edges() {
        let params = CallbackParams::from_pairs([("cat", "books")]);
        let rows = paginate("list.show", &params, 10, 200, 10);
        // nav, numbers, first/last
        assert_eq!(rows.len(), 3);
        let labels: Vec<&str> = rows[1].iter().map(|b| b.text.as_str()).collect();
        assert_eq!(labels, vec!["7", "8", "9", "\u{2714} 10", "11", "12", "13", "14"]);
        assert_eq!(rows[2][0].data, "list.show[cat=books&page=1]");
        assert_eq!(rows[2][1].data, "list.show[cat=books&page=20]");
    }

    #[test]
    fn test_window_clamped_to_last_page() {
        let rows = paginate("list.show", &CallbackParams::new(), 12, 120, 10);
        let labels: Vec<&str> = rows[1].iter().map(|b| b.text.as_str()).collect();
        assert_eq!(labels, vec!["9", "10", "11", "\u{2714} 12"]);
        // Last page: no "last" button
        assert_eq!(rows[2].len(), 1);
    }

    #[test]
    fn test_prepend_row() {
        let mut kb = InlineKeyboard::new().button(Button::callback("A", "a.index"));
        kb.prepend_row(vec![Button::callback("X", "x.index")]);
        assert_eq!(kb.as_rows()[0][0].text, "X");
        assert_eq!(kb.as_rows().len(), 2);
    }
}
