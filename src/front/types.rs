use std::rc::Rc;

/// SysY 的类型描述符。
///
/// 值语义、可共享、不可变：嵌套类型通过 `Rc` 共享，克隆开销为常数。
/// `Bool` 仅在编译器内部使用（条件归一化的结果），不会出现在源语言里。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    Int,
    Void,
    Bool,
    Ptr(Rc<Ty>),
    Array(Rc<Ty>, u32),
}

impl Ty {
    pub fn ptr_to(target: Ty) -> Ty {
        Ty::Ptr(Rc::new(target))
    }

    pub fn array_of(elem: Ty, len: u32) -> Ty {
        Ty::Array(Rc::new(elem), len)
    }

    /// Koopa IR 中的文本形式：`i32`、`*T`、`[T, N]`。
    pub fn render_ir(&self) -> String {
        match self {
            Ty::Int | Ty::Bool => "i32".to_string(),
            Ty::Void => String::new(),
            Ty::Ptr(target) => format!("*{}", target.render_ir()),
            Ty::Array(elem, len) => format!("[{}, {}]", elem.render_ir(), len),
        }
    }

    pub fn size_bytes(&self) -> u32 {
        match self {
            Ty::Int | Ty::Bool | Ty::Ptr(_) => 4,
            Ty::Void => 0,
            Ty::Array(elem, len) => elem.size_bytes() * len,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Ty::Array(..))
    }

    /// 指针的目标类型
    pub fn target(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(target) => Some(target),
            _ => None,
        }
    }

    /// 数组的元素类型
    pub fn elem(&self) -> Option<&Ty> {
        match self {
            Ty::Array(elem, _) => Some(elem),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_ir_forms() {
        assert_eq!(Ty::Int.render_ir(), "i32");
        assert_eq!(Ty::ptr_to(Ty::Int).render_ir(), "*i32");
        assert_eq!(Ty::array_of(Ty::Int, 2).render_ir(), "[i32, 2]");
        let nested = Ty::array_of(Ty::array_of(Ty::Int, 3), 2);
        assert_eq!(nested.render_ir(), "[[i32, 3], 2]");
        assert_eq!(Ty::ptr_to(Ty::array_of(Ty::Int, 3)).render_ir(), "*[i32, 3]");
    }

    #[test]
    fn computes_sizes() {
        assert_eq!(Ty::Int.size_bytes(), 4);
        assert_eq!(Ty::ptr_to(Ty::array_of(Ty::Int, 8)).size_bytes(), 4);
        assert_eq!(Ty::array_of(Ty::Int, 6).size_bytes(), 24);
        assert_eq!(Ty::array_of(Ty::array_of(Ty::Int, 3), 2).size_bytes(), 24);
        assert_eq!(Ty::Void.size_bytes(), 0);
    }

    #[test]
    fn accessors() {
        let arr = Ty::array_of(Ty::Int, 4);
        assert!(arr.is_array());
        assert_eq!(arr.elem(), Some(&Ty::Int));
        let ptr = Ty::ptr_to(arr.clone());
        assert!(ptr.is_ptr());
        assert_eq!(ptr.target(), Some(&arr));
        assert!(Ty::Bool.render_ir() == "i32");
    }
}
