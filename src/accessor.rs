/// Defines `get_$name`/`set_$name` accessors for a little-endian field at
/// a byte offset given by a `$name_offset()` method on the implementing
/// type. The type must expose `page: &mut Page` so the accessor can reach
/// the backing bytes.
macro_rules! field_accessor {
    ($name:ident, $t:ty) => {
        paste::paste! {
            #[inline(always)]
            pub fn [<get_ $name>](&self) -> $t {
                let offset = self.[<$name _offset>]();
                $t::from_le_bytes(
                    self.page.bytes()[offset..offset + std::mem::size_of::<$t>()]
                        .try_into()
                        .unwrap(),
                )
            }

            #[inline(always)]
            pub fn [<set_ $name>](&mut self, v: $t) {
                let offset = self.[<$name _offset>]();
                self.page.bytes_mut()[offset..offset + std::mem::size_of::<$t>()]
                    .copy_from_slice(&v.to_le_bytes());
            }
        }
    };
}

pub(crate) use field_accessor;
