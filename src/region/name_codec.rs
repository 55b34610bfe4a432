//! Mapping between region keys and the file names they occupy in the region directory.

use nom::{
    bytes::complete::tag,
    character::complete::{char, i32 as parse_i32},
    combinator::eof,
    error::{context, convert_error, ContextError, ParseError, VerboseError},
    Finish, IResult,
};
use thiserror::Error;

use super::region_key::RegionPos;
use crate::constants::DEFAULT_REGION_EXTENSION;

/// Converts a key into the name of its file and back again.
///
/// The two directions must be inverses for every valid name. Decoding a name
/// that was not produced by `encode` has to fail instead of guessing a key.
pub trait NameCodec<K> {
    fn encode(&self, key: &K) -> String;
    fn decode(&self, name: &str) -> Result<K, NameCodecError>;
}

/// Names regions as `<x>.<z>.<extension>`, for example `0.-1.2dr`.
#[derive(Clone, Debug)]
pub struct RegionPosCodec {
    extension: String,
}

impl RegionPosCodec {
    pub fn new(extension: impl Into<String>) -> RegionPosCodec {
        RegionPosCodec {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn parse_region_pos<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
        &self,
        input: &'a str,
    ) -> IResult<&'a str, RegionPos, E> {
        let (input, x) = context("region x", parse_i32)(input)?;
        let (input, _) = char('.')(input)?;
        let (input, z) = context("region z", parse_i32)(input)?;
        let (input, _) = char('.')(input)?;
        let (input, _) = context("region extension", tag(self.extension.as_str()))(input)?;
        let (input, _) = eof(input)?;

        Ok((input, RegionPos::new(x, z)))
    }
}

impl Default for RegionPosCodec {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_EXTENSION)
    }
}

impl NameCodec<RegionPos> for RegionPosCodec {
    fn encode(&self, key: &RegionPos) -> String {
        format!("{0}.{1}.{2}", key.x, key.z, self.extension)
    }

    fn decode(&self, name: &str) -> Result<RegionPos, NameCodecError> {
        let pos = match self.parse_region_pos::<VerboseError<&str>>(name).finish() {
            Ok((_, pos)) => pos,
            Err(e) => return Err(NameCodecError::ParseError(convert_error(name, e))),
        };

        //Signs and leading zeros parse fine but would not name the same file again
        if self.encode(&pos) != name {
            return Err(NameCodecError::NotCanonical(name.to_string()));
        }

        Ok(pos)
    }
}

#[derive(Debug, Error)]
pub enum NameCodecError {
    #[error("{0} is not the canonical name of a region")]
    NotCanonical(String),
    #[error("Region Name Parse Error {0}")]
    ParseError(String),
}
