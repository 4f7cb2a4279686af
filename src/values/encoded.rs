//! Binary and URI values

use base64::Engine;
use fake::faker::lorem::en::Word;
use fake::Fake;
use rand::{Rng, RngCore};
use url::Url;

use crate::error::{Error, Result};
use crate::schema::Facets;

/// Random bytes; length facets count octets
fn bytes(facets: &Facets, rng: &mut dyn RngCore) -> Vec<u8> {
    let (min, max) = facets.length_range();
    let max = max.unwrap_or(min + 8).max(min);
    let count = rng.random_range(min..=max);
    (0..count).map(|_| rng.random::<u8>()).collect()
}

pub(crate) fn hex(facets: &Facets, rng: &mut dyn RngCore) -> String {
    bytes(facets, rng)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

pub(crate) fn base64(facets: &Facets, rng: &mut dyn RngCore) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes(facets, rng))
}

/// An absolute `https` URI under `example.com`
///
/// With length facets the value degrades to a relative reference of
/// lowercase letters, which is still a valid `anyURI`.
pub(crate) fn uri(facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    if facets.length.is_some() || facets.min_length.is_some() || facets.max_length.is_some() {
        let (min, max) = facets.length_range();
        let max = max.unwrap_or(min.max(1) + 8).max(min);
        let len = rng.random_range(min..=max);
        return Ok((0..len)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect());
    }
    let host: String = Word().fake_with_rng(rng);
    let path: String = Word().fake_with_rng(rng);
    let url = Url::parse(&format!("https://{}.example.com/{}", host, path))
        .map_err(|e| Error::generation(format!("invalid generated URI: {}", e)))?;
    Ok(url.to_string())
}
