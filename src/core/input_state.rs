use crate::input::TextInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    SearchEdit,
    SendEdit,
}

#[derive(Clone, Default)]
pub struct InputFields {
    pub search: TextInput,
    pub send: TextInput,
}

impl InputFields {
    pub fn get_active_mut(&mut self, mode: InputMode) -> Option<&mut TextInput> {
        match mode {
            InputMode::SearchEdit => Some(&mut self.search),
            InputMode::SendEdit => Some(&mut self.send),
            InputMode::Normal => None,
        }
    }
}
