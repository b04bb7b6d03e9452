use super::Backend;
use crate::Result;

/// Input file backed by Memory
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create a new memory backend
    ///
    /// ## Arguments
    /// * 'data' - The data buffer to consume
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn bounds() {
        let memory = Memory::new(vec![0x10, 0x20, 0x30]);

        assert_eq!(memory.len(), 3);
        assert_eq!(memory.data_slice(1, 2).unwrap(), &[0x20, 0x30]);
        assert_eq!(memory.data_slice(3, 0).unwrap(), &[] as &[u8]);
        assert!(matches!(
            memory.data_slice(2, 2),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            memory.data_slice(usize::MAX, 1),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
