use crate::prelude::*;

/// An instruction pointer awaiting symbolization.
///
/// Native frames form linked chains through `parent_index`: each entry
/// names its caller's position in the native-frame list, with 0 meaning
/// "no frame". The list itself is indexed from 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedNativeFrame {
    /// The captured instruction pointer.
    pub ip: usize,
    /// Position of the parent frame in the native-frame list, 0 for none.
    pub parent_index: usize,
}

impl Parse for UnresolvedNativeFrame {
    fn parse<S: Source>(p: &mut Parser<'_, S>) -> Result<Self> {
        Ok(Self {
            ip: p.parse()?,
            parent_index: p.read_varint()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    #[test]
    fn parse_native_frame() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x7f00_1234_usize.to_le_bytes());
        data.push(0x02);

        let mut source = SliceSource::new(&data);
        let frame: UnresolvedNativeFrame = Parser::new(&mut source).parse().unwrap();

        assert_eq!(frame.ip, 0x7f00_1234);
        assert_eq!(frame.parent_index, 2);
    }
}
