//! Controls for server-side sorting ([RFC 2891]) and virtual list views
//! ([draft-ietf-ldapext-ldapv3-vlv][vlv]), which `ldap3` does not implement.
//!
//! A virtual list view request must always be accompanied by a sort request.
//!
//! [RFC 2891]: https://www.rfc-editor.org/rfc/rfc2891.html
//! [vlv]: https://datatracker.ietf.org/doc/html/draft-ietf-ldapext-ldapv3-vlv-09
use bytes::BytesMut;
use lber::{
	common::TagClass,
	parse::parse_tag,
	structure::StructureTag,
	structures::{ASNTag, Integer, OctetString, Sequence, Tag},
	write,
};
use ldap3::controls::RawControl;

use crate::{directory::VirtualListView, error::Error};

/// OID of the server-side sort request control
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";
/// OID of the virtual list view request control
pub const VLV_REQUEST_OID: &str = "2.16.840.1.113730.3.4.9";
/// OID of the virtual list view response control
pub const VLV_RESPONSE_OID: &str = "2.16.840.1.113730.3.4.10";
/// Largest offset or count a virtual list view request can carry
pub const MAX_INT: usize = i32::MAX as usize;

/// What the server reported about a virtual list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewResponse {
	/// Position of the target entry in the sorted result
	pub target_position: usize,
	/// The server's estimate of the size of the complete result
	pub content_count: usize,
	/// LDAP result code of the view, 0 on success
	pub result: u32,
}

/// Encode a tag into its BER form.
fn encode(tag: Tag) -> Result<Vec<u8>, Error> {
	let mut buf = BytesMut::new();
	write::encode_into(&mut buf, tag.into_structure())?;
	Ok(buf.to_vec())
}

/// An INTEGER tag of the range `0..=MAX_INT`.
fn integer(value: usize) -> Result<Tag, Error> {
	let inner = i32::try_from(value)
		.map_err(|_| Error::InvalidArgument(format!("{value} is too large for a control")))?;
	Ok(Tag::Integer(Integer { inner: i64::from(inner), ..Default::default() }))
}

/// The sort request control, sorting ascending by `attribute`.
pub fn sort_control(attribute: &str) -> Result<RawControl, Error> {
	let key = Tag::Sequence(Sequence {
		inner: vec![Tag::OctetString(OctetString {
			inner: attribute.as_bytes().to_vec(),
			..Default::default()
		})],
		..Default::default()
	});
	let keys = Tag::Sequence(Sequence { inner: vec![key], ..Default::default() });
	Ok(RawControl { ctype: SORT_REQUEST_OID.to_owned(), crit: true, val: Some(encode(keys)?) })
}

/// The virtual list view request control, selecting the window by offset.
pub fn view_control(view: &VirtualListView) -> Result<RawControl, Error> {
	let by_offset = Tag::Sequence(Sequence {
		id: 0,
		class: TagClass::Context,
		inner: vec![integer(view.offset)?, integer(view.content_count)?],
	});
	let request = Tag::Sequence(Sequence {
		inner: vec![integer(view.before_count)?, integer(view.after_count)?, by_offset],
		..Default::default()
	});
	Ok(RawControl { ctype: VLV_REQUEST_OID.to_owned(), crit: true, val: Some(encode(request)?) })
}

/// Read a non-negative INTEGER or ENUMERATED value.
fn unsigned(tag: Option<StructureTag>) -> Result<u64, Error> {
	let bytes = tag
		.and_then(StructureTag::expect_primitive)
		.ok_or_else(|| Error::Invalid("missing integer in view response".to_owned()))?;
	if bytes.len() > 8 || bytes.first().is_some_and(|byte| byte & 0x80 != 0) {
		return Err(Error::Invalid("integer in view response out of range".to_owned()));
	}
	Ok(bytes.iter().fold(0, |value, byte| value << 8 | u64::from(*byte)))
}

/// Decode the value of a virtual list view response control.
pub fn parse_view_response(val: &[u8]) -> Result<ViewResponse, Error> {
	let (_, tag) =
		parse_tag(val).map_err(|_| Error::Invalid("malformed view response".to_owned()))?;
	let mut parts = tag
		.expect_constructed()
		.ok_or_else(|| Error::Invalid("view response is not a sequence".to_owned()))?
		.into_iter();
	let to_usize = |value: u64| {
		usize::try_from(value).map_err(|_| Error::Invalid("view position too large".to_owned()))
	};
	let target_position = to_usize(unsigned(parts.next())?)?;
	let content_count = to_usize(unsigned(parts.next())?)?;
	let result = u32::try_from(unsigned(parts.next())?)
		.map_err(|_| Error::Invalid("view result code too large".to_owned()))?;
	Ok(ViewResponse { target_position, content_count, result })
}
