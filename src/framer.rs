#[derive(Debug, Default, PartialEq, Eq)]
pub struct Framed {
    pub chunk: Option<String>,
    pub lines: Vec<String>,
}

impl Framed {
    pub fn is_empty(&self) -> bool {
        self.chunk.is_none() && self.lines.is_empty()
    }
}

pub struct ByteFramer {
    pending: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    carry: Vec<u8>,
    max_chunk_length: usize,
}

impl ByteFramer {
    pub fn new(max_chunk_length: usize) -> Self {
        Self {
            pending: String::new(),
            carry: Vec::new(),
            max_chunk_length,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Framed {
        let mut out = Framed::default();
        if bytes.is_empty() {
            return out;
        }
        self.decode(bytes);
        if self.pending.is_empty() {
            return out;
        }

        let had_newline = match self.pending.rfind('\n') {
            Some(last_newline) => {
                let rest = self.pending.split_off(last_newline + 1);
                self.pending.pop();
                out.lines.extend(self.pending.split('\n').map(str::to_string));
                self.pending = rest;
                true
            }
            None => false,
        };

        // Forced flush only applies to reads that carried no newline.
        if !had_newline && self.pending.chars().count() > self.max_chunk_length {
            out.lines.push(std::mem::take(&mut self.pending));
        } else if !self.pending.is_empty() {
            out.chunk = Some(self.pending.clone());
        }
        out
    }

    #[cfg(test)]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn decode(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
        let input = std::mem::take(&mut self.carry);
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.pending.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    self.pending.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }
}
