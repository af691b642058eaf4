//! Turning raw response bodies into typed results.
//!
//! # Design
//! A converter is a value implementing `DataConvertible`, so the caller picks
//! the output shape at the call site and no runtime type inspection happens.
//! Converters that need an actual body implement `BytesConvertible` instead;
//! the blanket impl turns an absent body into `ConversionError::missing_data`
//! before their conversion ever runs.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::codec::JsonCodec;
use crate::error::ConversionError;

/// Converts an optional response body into `Output`.
pub trait DataConvertible: Send + 'static {
    type Output: Send + 'static;

    fn convert(&self, data: Option<Vec<u8>>) -> Result<Self::Output, ConversionError>;
}

/// Converts a body that must be present.
pub trait BytesConvertible: Send + 'static {
    type Output: Send + 'static;

    fn convert_bytes(&self, bytes: Vec<u8>) -> Result<Self::Output, ConversionError>;
}

impl<C: BytesConvertible> DataConvertible for C {
    type Output = C::Output;

    fn convert(&self, data: Option<Vec<u8>>) -> Result<Self::Output, ConversionError> {
        match data {
            Some(bytes) => self.convert_bytes(bytes),
            None => Err(ConversionError::missing_data()),
        }
    }
}

/// Body bytes as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl BytesConvertible for RawBytes {
    type Output = Vec<u8>;

    fn convert_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>, ConversionError> {
        Ok(bytes)
    }
}

/// The body, or its absence, passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaybeBytes;

impl DataConvertible for MaybeBytes {
    type Output = Option<Vec<u8>>;

    fn convert(&self, data: Option<Vec<u8>>) -> Result<Self::Output, ConversionError> {
        Ok(data)
    }
}

/// UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl BytesConvertible for Text {
    type Output = String;

    fn convert_bytes(&self, bytes: Vec<u8>) -> Result<String, ConversionError> {
        String::from_utf8(bytes).map_err(|e| ConversionError::new(format!("body is not valid UTF-8: {e}")))
    }
}

/// Discards the body; only success or failure matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl DataConvertible for Empty {
    type Output = ();

    fn convert(&self, _data: Option<Vec<u8>>) -> Result<(), ConversionError> {
        Ok(())
    }
}

/// Structured decode through a `JsonCodec`.
pub struct Json<T> {
    codec: JsonCodec,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    pub fn new(codec: JsonCodec) -> Self {
        Self {
            codec,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new(JsonCodec::default())
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        Self::new(self.codec)
    }
}

impl<T> std::fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Json")
            .field("codec", &self.codec)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + Send + 'static> BytesConvertible for Json<T> {
    type Output = T;

    fn convert_bytes(&self, bytes: Vec<u8>) -> Result<T, ConversionError> {
        self.codec.decode(&bytes)
    }
}

/// Output types that come with a natural converter, so the converter can be
/// chosen from the requested type alone.
pub trait Convertible: Send + Sized + 'static {
    type Converter: DataConvertible<Output = Self> + Default;
}

impl Convertible for Vec<u8> {
    type Converter = RawBytes;
}

impl Convertible for Option<Vec<u8>> {
    type Converter = MaybeBytes;
}

impl Convertible for String {
    type Converter = Text;
}

impl Convertible for () {
    type Converter = Empty;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyCasing;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct User {
        id: i64,
        name: String,
    }

    #[test]
    fn empty_accepts_anything() {
        assert!(Empty.convert(None).is_ok());
        assert!(Empty.convert(Some(Vec::new())).is_ok());
        assert!(Empty.convert(Some(vec![0xff, 0xfe])).is_ok());
    }

    #[test]
    fn required_converters_reject_missing_data() {
        assert_eq!(RawBytes.convert(None).unwrap_err(), ConversionError::missing_data());
        assert_eq!(Text.convert(None).unwrap_err(), ConversionError::missing_data());
        let err = Json::<User>::default().convert(None).unwrap_err();
        assert_eq!(err.message(), "missing data");
    }

    #[test]
    fn maybe_bytes_passes_absence_through() {
        assert_eq!(MaybeBytes.convert(None).unwrap(), None);
        assert_eq!(MaybeBytes.convert(Some(vec![1, 2])).unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn raw_bytes_is_identity() {
        assert_eq!(RawBytes.convert(Some(vec![9, 8, 7])).unwrap(), vec![9, 8, 7]);
        assert_eq!(RawBytes.convert(Some(Vec::new())).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        assert_eq!(Text.convert(Some(b"hola".to_vec())).unwrap(), "hola");
        let err = Text.convert(Some(vec![0xc3, 0x28])).unwrap_err();
        assert!(err.message().contains("UTF-8"));
    }

    #[test]
    fn json_decodes_user() {
        let user = Json::<User>::default()
            .convert(Some(br#"{"id":1,"name":"Ana"}"#.to_vec()))
            .unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "Ana".to_string()
            }
        );
    }

    #[test]
    fn json_wraps_decode_errors() {
        let err = Json::<User>::new(JsonCodec::new(KeyCasing::CamelCase))
            .convert(Some(br#"{"id":"one"}"#.to_vec()))
            .unwrap_err();
        assert!(!err.message().is_empty());
    }

    #[test]
    fn convertible_picks_converter_from_type() {
        fn convert<T: Convertible>(data: Option<Vec<u8>>) -> Result<T, ConversionError> {
            T::Converter::default().convert(data)
        }
        assert_eq!(convert::<String>(Some(b"ok".to_vec())).unwrap(), "ok");
        assert_eq!(convert::<Option<Vec<u8>>>(None).unwrap(), None);
        assert!(convert::<()>(None).is_ok());
        assert!(convert::<Vec<u8>>(None).is_err());
    }
}
