#[derive(Clone, Default)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn insert_char(&mut self, c: char) {
        let byte_idx = self.byte_index(self.cursor);
        self.text.insert(byte_idx, c);
        self.cursor += 1;
    }

    pub fn delete_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_idx = self.byte_index(self.cursor);
            self.text.remove(byte_idx);
        }
    }

    pub fn delete_char_at_cursor(&mut self) {
        if self.cursor < self.char_len() {
            let byte_idx = self.byte_index(self.cursor);
            self.text.remove(byte_idx);
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    pub fn move_cursor_to_start(&mut self) {
        self.cursor = 0;
    }

    pub fn move_cursor_to_end(&mut self) {
        self.cursor = self.char_len();
    }

    /// Hand the text over and leave the field empty (send box).
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_multibyte_text() {
        let mut input = TextInput::default();
        for c in "héllo".chars() {
            input.insert_char(c);
        }
        input.move_cursor_left();
        input.move_cursor_left();
        input.delete_char_before_cursor();
        assert_eq!(input.text, "hélo");
        assert_eq!(input.cursor, 2);

        input.move_cursor_to_start();
        input.delete_char_at_cursor();
        assert_eq!(input.text, "élo");
    }

    #[test]
    fn test_take_empties_field() {
        let mut input = TextInput::default();
        input.insert_char('a');
        input.insert_char('t');
        assert_eq!(input.take(), "at");
        assert!(input.text.is_empty());
        assert_eq!(input.cursor, 0);
    }
}
