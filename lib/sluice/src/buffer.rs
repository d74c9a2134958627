use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

// Capacity is reserved in multiples of this.
const BUF_SIZE_INCREMENT: usize = 65536;

/// A buffered FIFO byte queue over a contiguous window. Data is appended at
/// the tail and consumed from the head; both sides of the window are
/// exposed as plain slices.
pub struct Buffer {
    data: ByteDeque,
    size: usize,
}

impl Buffer {
    /// Creates a buffer with at least `size` bytes of capacity, rounded up
    /// to the reservation increment.
    #[inline]
    pub fn new(size: usize) -> Buffer {
        let increments = (size + BUF_SIZE_INCREMENT - 1) / BUF_SIZE_INCREMENT;
        let size = increments.max(1) * BUF_SIZE_INCREMENT;

        let mut data = ByteDeque::new();
        data.reserve(size);
        Buffer { data, size }
    }

    /// The number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true in case the buffer is empty, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining free capacity in the buffer.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.size - self.data.len()
    }

    /// Consume `count` bytes from the head.
    #[inline]
    pub fn move_head(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    /// Commit `count` bytes written to the tail.
    #[inline]
    pub fn move_tail(&mut self, count: usize) {
        unsafe { self.data.move_tail(count as isize) }
    }

    /// Slice containing data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn clear(&mut self) {
        unsafe { self.data.move_head(self.len() as isize) };
    }

    /// Slice containing free capacity to be written.
    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        let free = self.free_capacity();
        unsafe { &mut self.data.tail_head_slice()[..free] }
    }

    /// Append as much of `bytes` as fits, growing capacity in increments
    /// when needed. Returns the number of bytes taken.
    #[inline]
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        if bytes.len() > self.free_capacity() {
            let needed = self.data.len() + bytes.len();
            let increments = (needed + BUF_SIZE_INCREMENT - 1) / BUF_SIZE_INCREMENT;
            let target = increments * BUF_SIZE_INCREMENT;
            self.data.reserve(target - self.data.len());
            self.size = target;
        }

        let count = bytes.len();
        let slice = self.write_slice();
        slice[..count].copy_from_slice(bytes);
        self.move_tail(count);
        count
    }

    /// One read from the supplied reader into the free window. Returns the
    /// byte count from the reader verbatim; zero either means the reader
    /// hit its end or the window is full.
    #[inline]
    pub fn fill_from<R: io::Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.free_capacity() == 0 {
            return Ok(0);
        }

        let count = reader.read(self.write_slice())?;
        self.move_tail(count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;

    struct MockSource {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
    }

    impl MockSource {
        fn new(data: Vec<u8>, chunk: usize) -> MockSource {
            MockSource {
                data,
                cursor: 0,
                chunk,
            }
        }
    }

    impl io::Read for MockSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    #[test]
    fn test_fill_and_drain() {
        let mock_data: Vec<_> = (0..1000).map(|item| item as u8).collect();
        let mut source = MockSource::new(mock_data.clone(), 300);
        let mut buffer = Buffer::new(1);

        let mut total = 0;
        loop {
            match buffer.fill_from(&mut source) {
                Ok(count) => total += count,
                Err(err) => {
                    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
                    break;
                }
            }
        }

        assert_eq!(total, mock_data.len());
        assert_eq!(buffer.read_slice(), &mock_data[..]);

        buffer.move_head(400);
        assert_eq!(buffer.len(), 600);
        assert_eq!(buffer.read_slice(), &mock_data[400..]);
    }

    #[test]
    fn test_rounds_capacity_up() {
        let buffer = Buffer::new(100_000);
        assert_eq!(buffer.free_capacity(), 2 * BUF_SIZE_INCREMENT);
    }

    #[test]
    fn test_push_bytes_grows() {
        let mut buffer = Buffer::new(1);
        let big = vec![7u8; BUF_SIZE_INCREMENT + 10];

        assert_eq!(buffer.push_bytes(&big), big.len());
        assert_eq!(buffer.read_slice(), &big[..]);
    }

    #[test]
    fn test_fill_stops_when_full() {
        let data = vec![1u8; 2 * BUF_SIZE_INCREMENT];
        let mut cursor = io::Cursor::new(data);
        let mut buffer = Buffer::new(BUF_SIZE_INCREMENT);

        let mut total = 0;
        loop {
            let count = buffer.fill_from(&mut cursor).unwrap();
            if count == 0 {
                break;
            }
            total += count;
        }

        assert_eq!(total, BUF_SIZE_INCREMENT);
        assert_eq!(buffer.free_capacity(), 0);
    }

    #[test]
    fn test_clear() {
        let mut buffer = Buffer::new(1);
        buffer.push_bytes(&[1, 2, 3]);
        buffer.clear();

        assert!(buffer.is_empty());
    }
}
