use std::sync::Arc;

use bytes::Bytes;

/// Decodes payload bytes into the application type `T`. The core treats
/// it as an opaque `decode(bytes) -> T`, implemented outside this crate
/// by the schema layer.
pub trait SchemaDecoder<T>: Send + Sync {
    fn decode(&self, bytes: &Bytes) -> T;
}

/// Fetches per-version decoders. `decoder_for_version` returning `None`
/// means "fall back to the base schema".
pub trait SchemaProvider<T>: Send + Sync {
    fn base_decoder(&self) -> Arc<dyn SchemaDecoder<T>>;
    fn decoder_for_version(&self, version: u32) -> Option<Arc<dyn SchemaDecoder<T>>>;
}

/// Picks the decoder a freshly-received message should use: the
/// version-specific one when both a version is present and the provider
/// has one, otherwise the base schema.
pub fn select_decoder<T>(provider: &dyn SchemaProvider<T>, schema_version: Option<u32>) -> Arc<dyn SchemaDecoder<T>> {
    match schema_version.and_then(|v| provider.decoder_for_version(v)) {
        Some(decoder) => decoder,
        None => provider.base_decoder(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;
    impl SchemaDecoder<String> for Upper {
        fn decode(&self, bytes: &Bytes) -> String {
            String::from_utf8(bytes.to_vec()).unwrap().to_uppercase()
        }
    }
    struct Identity;
    impl SchemaDecoder<String> for Identity {
        fn decode(&self, bytes: &Bytes) -> String {
            String::from_utf8(bytes.to_vec()).unwrap()
        }
    }
    struct Provider;
    impl SchemaProvider<String> for Provider {
        fn base_decoder(&self) -> Arc<dyn SchemaDecoder<String>> {
            Arc::new(Identity)
        }
        fn decoder_for_version(&self, version: u32) -> Option<Arc<dyn SchemaDecoder<String>>> {
            (version == 2).then(|| Arc::new(Upper) as Arc<dyn SchemaDecoder<String>>)
        }
    }

    #[test]
    fn known_version_uses_its_own_decoder() {
        let d = select_decoder(&Provider, Some(2));
        assert_eq!(d.decode(&Bytes::from_static(b"hi")), "HI");
    }

    #[test]
    fn unknown_version_falls_back_to_base() {
        let d = select_decoder(&Provider, Some(99));
        assert_eq!(d.decode(&Bytes::from_static(b"hi")), "hi");
    }

    #[test]
    fn no_version_uses_base() {
        let d = select_decoder(&Provider, None);
        assert_eq!(d.decode(&Bytes::from_static(b"hi")), "hi");
    }
}
