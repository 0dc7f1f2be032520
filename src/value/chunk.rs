/// Parse a comma separated chunk-size sequence such as `100,200,-1`.
///
/// A zero or negative entry means "the rest of the current write".
pub fn parse_chunk_sizes(input: &str) -> Result<Vec<i64>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty chunk size list".to_string());
    }

    input
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.parse::<i64>()
                .map_err(|_| format!("'{item}' is not an integer chunk size"))
        })
        .collect()
}

pub fn format_chunk_sizes(sizes: &[i64]) -> String {
    sizes
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Stateful cursor over a chunk-size sequence.
///
/// Yields successive sizes and sticks on the last one once exhausted.
/// `None` means unbounded: consume everything that is left.
#[derive(Debug, Clone)]
pub struct ChunkSizes {
    sizes: Vec<i64>,
    position: usize,
}

impl ChunkSizes {
    pub fn new(sizes: Vec<i64>) -> Self {
        Self { sizes, position: 0 }
    }

    pub fn next_size(&mut self) -> Option<usize> {
        let size = match self.sizes.get(self.position) {
            Some(size) => {
                self.position += 1;
                *size
            }
            None => *self.sizes.last()?,
        };

        if size <= 0 { None } else { Some(size as usize) }
    }
}
