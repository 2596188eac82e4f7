use std::fmt;

#[derive(Debug)]
pub enum CompilerError {
    // I/O 错误
    IoError(std::io::Error),
    // 词法/语法分析错误
    ParseError(String),
    // 语义错误（重定义、常量赋值、越界初始化列表等）
    SemanticError(String),
    // IR 生成阶段的内部错误
    IRGenerationError(String),
    // 目标代码生成阶段的内部错误
    CodeGenerationError(String),
    // 命令行参数错误
    ArgsError(String),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::IoError(e) => write!(f, "I/O error: {}", e),
            CompilerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CompilerError::SemanticError(msg) => write!(f, "Semantic error: {}", msg),
            CompilerError::IRGenerationError(msg) => write!(f, "IR generation error: {}", msg),
            CompilerError::CodeGenerationError(msg) => write!(f, "Code generation error: {}", msg),
            CompilerError::ArgsError(msg) => write!(f, "Argument error: {}", msg),
        }
    }
}

impl std::error::Error for CompilerError {}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::IoError(err)
    }
}
