//! Rendering of JVM type descriptors into readable dotted names.
//!
//! A field descriptor like `[Ljava/lang/String;` becomes
//! `java.lang.String[]`, a method descriptor like `(I[J)V` becomes the
//! parameter list `["int", "long[]"]` plus return type `"void"`.

use super::ClassFileError;

struct DescriptorCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    raw: &'a str,
}

impl<'a> DescriptorCursor<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            bytes: raw.as_bytes(),
            pos: 0,
            raw,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) -> Result<u8, ClassFileError> {
        let byte = self
            .peek()
            .ok_or_else(|| ClassFileError::BadDescriptor(self.raw.to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect(&mut self, byte: u8) -> Result<(), ClassFileError> {
        if self.advance()? != byte {
            return Err(ClassFileError::BadDescriptor(self.raw.to_string()));
        }
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn parse_type(&mut self) -> Result<String, ClassFileError> {
        let mut dims = 0usize;
        while self.peek() == Some(b'[') {
            self.pos += 1;
            dims += 1;
        }

        let base = match self.advance()? {
            b'B' => "byte".to_string(),
            b'C' => "char".to_string(),
            b'D' => "double".to_string(),
            b'F' => "float".to_string(),
            b'I' => "int".to_string(),
            b'J' => "long".to_string(),
            b'S' => "short".to_string(),
            b'Z' => "boolean".to_string(),
            b'V' => "void".to_string(),
            b'L' => {
                let start = self.pos;
                while self.peek() != Some(b';') {
                    if self.at_end() {
                        return Err(ClassFileError::BadDescriptor(self.raw.to_string()));
                    }
                    self.pos += 1;
                }
                let name = &self.raw[start..self.pos];
                self.pos += 1;
                name.replace('/', ".")
            }
            _ => return Err(ClassFileError::BadDescriptor(self.raw.to_string())),
        };

        let mut rendered = base;
        for _ in 0..dims {
            rendered.push_str("[]");
        }
        Ok(rendered)
    }
}

/// Render a single field descriptor as a dotted type name.
pub(crate) fn type_name(descriptor: &str) -> Result<String, ClassFileError> {
    let mut cursor = DescriptorCursor::new(descriptor);
    let rendered = cursor.parse_type()?;
    if !cursor.at_end() {
        return Err(ClassFileError::BadDescriptor(descriptor.to_string()));
    }
    Ok(rendered)
}

/// Render a method descriptor as (parameter types, return type).
pub(crate) fn method_signature(
    descriptor: &str,
) -> Result<(Vec<String>, String), ClassFileError> {
    let mut cursor = DescriptorCursor::new(descriptor);
    cursor.expect(b'(')?;

    let mut parameters = Vec::new();
    while cursor.peek() != Some(b')') {
        if cursor.at_end() {
            return Err(ClassFileError::BadDescriptor(descriptor.to_string()));
        }
        parameters.push(cursor.parse_type()?);
    }
    cursor.expect(b')')?;

    let return_type = cursor.parse_type()?;
    if !cursor.at_end() {
        return Err(ClassFileError::BadDescriptor(descriptor.to_string()));
    }
    Ok((parameters, return_type))
}

/// Render the class named by a member-ref owner slot. Owners are usually
/// plain internal names, but array targets (`clone()` on `[I` and friends)
/// arrive as descriptors.
pub(crate) fn owner_name(internal: &str) -> Result<String, ClassFileError> {
    if internal.starts_with('[') {
        type_name(internal)
    } else {
        Ok(internal.replace('/', "."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_and_object_types() {
        assert_eq!(type_name("I").unwrap(), "int");
        assert_eq!(type_name("Ljava/lang/String;").unwrap(), "java.lang.String");
    }

    #[test]
    fn test_array_dimensions_render_as_suffixes() {
        assert_eq!(type_name("[[I").unwrap(), "int[][]");
        assert_eq!(
            type_name("[Ljava/lang/String;").unwrap(),
            "java.lang.String[]"
        );
    }

    #[test]
    fn test_method_signature_splits_parameters() {
        let (params, ret) = method_signature("(I[JLjava/lang/String;)V").unwrap();
        assert_eq!(params, vec!["int", "long[]", "java.lang.String"]);
        assert_eq!(ret, "void");
    }

    #[test]
    fn test_no_arg_method() {
        let (params, ret) = method_signature("()Ljava/util/List;").unwrap();
        assert!(params.is_empty());
        assert_eq!(ret, "java.util.List");
    }

    #[test]
    fn test_malformed_descriptor_is_rejected() {
        assert!(type_name("Lcom/x/Unterminated").is_err());
        assert!(type_name("Q").is_err());
        assert!(method_signature("(I").is_err());
        assert!(type_name("II").is_err());
    }

    #[test]
    fn test_array_owner_renders_via_descriptor() {
        assert_eq!(owner_name("[I").unwrap(), "int[]");
        assert_eq!(owner_name("com/x/Foo").unwrap(), "com.x.Foo");
    }
}
