use std::collections::BTreeSet;

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map_res,
    multi::separated_list1,
    sequence::delimited,
};

use super::PermissionOperation;
use crate::error::PermissionConflict;

fn is_op_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn operation(input: &str) -> IResult<&str, PermissionOperation> {
    map_res(
        delimited(multispace0, take_while1(is_op_char), multispace0),
        str::parse::<PermissionOperation>,
    )(input)
}

fn operation_list(input: &str) -> IResult<&str, Vec<PermissionOperation>> {
    separated_list1(char(','), operation)(input)
}

/// Parse a comma separated list such as `"read, write, read_acl"`.
pub fn parse_operations(input: &str) -> Result<BTreeSet<PermissionOperation>, PermissionConflict> {
    if input.trim().is_empty() {
        return Err(PermissionConflict::NoOperations);
    }
    match operation_list(input) {
        Ok(("", ops)) => Ok(ops.into_iter().collect()),
        // Report the first token that is not a known operation.
        _ => {
            let bad = input
                .split(',')
                .map(str::trim)
                .find(|token| token.parse::<PermissionOperation>().is_err())
                .unwrap_or(input.trim());
            Err(PermissionConflict::InvalidOperation(bad.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_with_spaces() {
        let ops = parse_operations("read, write ,read_acl").unwrap();
        assert_eq!(
            ops,
            [
                PermissionOperation::Read,
                PermissionOperation::Write,
                PermissionOperation::ReadAcl
            ]
            .into_iter()
            .collect()
        );
    }

    #[test]
    fn parse_is_case_insensitive_and_dedups() {
        let ops = parse_operations("DELETE,delete").unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn unknown_operation_is_named() {
        assert_eq!(
            parse_operations("read, admin"),
            Err(PermissionConflict::InvalidOperation("admin".into()))
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(parse_operations("  "), Err(PermissionConflict::NoOperations));
        assert!(parse_operations("read,").is_err());
    }
}
