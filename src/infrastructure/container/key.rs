use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 能力标识：类型（可以是 `dyn Trait`）+ 可选的绑定名
#[derive(Clone, Debug)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<String>,
}

impl Key {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    /// 具名绑定的标识
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_type_name(self.type_name))?;
        if let Some(name) = &self.name {
            write!(f, "#{}", name)?;
        }
        Ok(())
    }
}

/// 去掉类型名中的模块路径：`alloc::vec::Vec<my::Foo>` -> `Vec<Foo>`
pub(crate) fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            push_last_segment(&mut short, &segment);
            segment.clear();
            short.push(ch);
        }
    }
    push_last_segment(&mut short, &segment);
    short
}

fn push_last_segment(out: &mut String, path: &str) {
    out.push_str(path.rsplit("::").next().unwrap_or(path));
}
