//! Recursive-descent parser with a Pratt expression layer for WHERE, over
//! the full combined grammar (SELECT/GET/PUT/UPDATE/DELETE/QUERY/COUNT/
//! BATCH/TRANSACT) rather than per-clause mini-parsers.

use super::ast::*;
use super::errors::{QlError, QlResult};
use super::lexer::{lex, Spanned, Token};
use crate::value::{Path, PathSegment};

const FUNCTIONS: &[&str] = &[
    "exists",
    "not_exists",
    "is_defined",
    "is_not_defined",
    "is_type",
    "contains",
    "starts_with",
    "array_contains",
    "array_contains_any",
    "length",
    "array_length",
];

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_pos(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn peek_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.peek_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> QlResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(kw))
        }
    }

    fn expect(&mut self, tok: Token) -> QlResult<()> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", tok)))
        }
    }

    fn unexpected(&self, expected: &str) -> QlError {
        QlError::UnexpectedToken {
            found: format!("{:?}", self.peek()),
            pos: self.peek_pos(),
            expected: expected.into(),
        }
    }

    fn expect_ident(&mut self) -> QlResult<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(QlError::UnexpectedToken {
                found: format!("{:?}", other),
                pos: self.peek_pos(),
                expected: "identifier".into(),
            }),
        }
    }

    // ---- paths ----

    fn parse_path(&mut self) -> QlResult<Path> {
        let mut segments = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let dollar = name.starts_with('$');
            let name = if dollar { name[1..].to_string() } else { name };
            segments.push(PathSegment::Field { name, dollar });
            while *self.peek() == Token::LBracket {
                self.advance();
                match self.peek().clone() {
                    Token::Minus => {
                        self.advance();
                        segments.push(PathSegment::Append);
                    }
                    Token::Int(n) if n >= 0 => {
                        self.advance();
                        segments.push(PathSegment::Index(n as usize));
                    }
                    _ => return Err(self.unexpected("array index or '-'")),
                }
                self.expect(Token::RBracket)?;
            }
            if *self.peek() == Token::Dot {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Path(segments))
    }

    // ---- operands (scalars, fields, params, calls, composite literals) ----

    fn parse_operand(&mut self) -> QlResult<Expr> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(n)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(f)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Token::Param(name) => {
                self.advance();
                Ok(Expr::Param(name))
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    items.push(self.parse_operand()?);
                    while *self.peek() == Token::Comma {
                        self.advance();
                        items.push(self.parse_operand()?);
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Literal(Literal::Array(items)))
            }
            Token::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                if *self.peek() != Token::RBrace {
                    entries.push(self.parse_object_entry()?);
                    while *self.peek() == Token::Comma {
                        self.advance();
                        entries.push(self.parse_object_entry()?);
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Literal(Literal::Object(entries)))
            }
            Token::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Bool(true)));
                }
                if name.eq_ignore_ascii_case("false") {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Bool(false)));
                }
                if name.eq_ignore_ascii_case("null") {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Null));
                }
                let folded = name.to_ascii_lowercase();
                if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::LParen)
                    && FUNCTIONS.contains(&folded.as_str())
                {
                    self.advance();
                    self.advance(); // LParen
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        args.push(self.parse_operand()?);
                        while *self.peek() == Token::Comma {
                            self.advance();
                            args.push(self.parse_operand()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Call { name: folded, args });
                }
                if self.tokens.get(self.pos + 1).map(|s| &s.token) == Some(&Token::LParen) {
                    return Err(QlError::UnknownFunction(name));
                }
                let path = self.parse_path()?;
                Ok(Expr::Field(path))
            }
            other => Err(QlError::UnexpectedToken {
                found: format!("{:?}", other),
                pos: self.peek_pos(),
                expected: "an operand".into(),
            }),
        }
    }

    fn parse_object_entry(&mut self) -> QlResult<(String, Expr)> {
        let key = match self.advance() {
            Token::Str(s) => s,
            Token::Ident(s) => s,
            other => {
                return Err(QlError::UnexpectedToken {
                    found: format!("{:?}", other),
                    pos: self.peek_pos(),
                    expected: "object key".into(),
                })
            }
        };
        self.expect(Token::Colon)?;
        let value = self.parse_operand()?;
        Ok((key, value))
    }

    // ---- boolean expression grammar: not > and > or ----

    fn parse_comparison(&mut self) -> QlResult<Expr> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Token::Eq => Some(BinOp::Eq),
            Token::Neq => Some(BinOp::Neq),
            Token::Lt => Some(BinOp::Lt),
            Token::Lte => Some(BinOp::Lte),
            Token::Gt => Some(BinOp::Gt),
            Token::Gte => Some(BinOp::Gte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_operand()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        if self.peek_kw("between") {
            self.advance();
            let low = self.parse_operand()?;
            self.expect_kw("and")?;
            let high = self.parse_operand()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
            });
        }
        if self.peek_kw("in") {
            self.advance();
            return self.parse_in_list(left, false);
        }
        if self.peek_kw("not")
            && matches!(self.tokens.get(self.pos + 1).map(|s| &s.token), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("in"))
        {
            self.advance();
            self.advance();
            return self.parse_in_list(left, true);
        }
        Ok(left)
    }

    fn parse_in_list(&mut self, left: Expr, negated: bool) -> QlResult<Expr> {
        self.expect(Token::LParen)?;
        let mut list = Vec::new();
        if *self.peek() != Token::RParen {
            list.push(self.parse_operand()?);
            while *self.peek() == Token::Comma {
                self.advance();
                list.push(self.parse_operand()?);
            }
        }
        self.expect(Token::RParen)?;
        Ok(Expr::In {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn parse_bool_primary(&mut self) -> QlResult<Expr> {
        if *self.peek() == Token::LParen {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            Ok(inner)
        } else {
            self.parse_comparison()
        }
    }

    fn parse_unary(&mut self) -> QlResult<Expr> {
        if self.peek_kw("not") {
            self.advance();
            let inner = self.parse_unary()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_bool_primary()
        }
    }

    fn parse_and(&mut self) -> QlResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek_kw("and") {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Logical(Box::new(left), LogOp::And, Box::new(right));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> QlResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_kw("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical(Box::new(left), LogOp::Or, Box::new(right));
        }
        Ok(left)
    }

    // ---- SELECT / ORDER BY / pagination ----

    fn parse_select_list(&mut self) -> QlResult<Select> {
        if let Token::Param(name) = self.peek().clone() {
            self.advance();
            return Ok(Select::Param(name));
        }
        if *self.peek() == Token::Star {
            self.advance();
            return Ok(Select::All);
        }
        let mut paths = vec![self.parse_path()?];
        while *self.peek() == Token::Comma {
            self.advance();
            paths.push(self.parse_path()?);
        }
        Ok(Select::Fields(paths))
    }

    fn parse_order_by(&mut self) -> QlResult<OrderByClause> {
        if let Token::Param(name) = self.peek().clone() {
            self.advance();
            return Ok(OrderByClause::Param(name));
        }
        let mut terms = Vec::new();
        loop {
            let path = self.parse_path()?;
            let direction = if self.eat_kw("asc") {
                SortDirection::Asc
            } else if self.eat_kw("desc") {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            terms.push(OrderTerm { path, direction });
            if *self.peek() == Token::Comma {
                self.advance();
                continue;
            }
            break;
        }
        Ok(OrderByClause::Terms(terms))
    }

    fn parse_uint(&mut self) -> QlResult<u64> {
        match self.advance() {
            Token::Int(n) if n >= 0 => Ok(n as u64),
            other => Err(QlError::UnexpectedToken {
                found: format!("{:?}", other),
                pos: self.peek_pos(),
                expected: "non-negative integer".into(),
            }),
        }
    }

    fn parse_query_tail(&mut self, select: Option<Select>) -> QlResult<QueryClause> {
        let mut clause = QueryClause {
            select,
            ..Default::default()
        };
        loop {
            if self.peek_kw("where") && clause.where_.is_none() {
                self.advance();
                clause.where_ = Some(self.parse_or()?);
            } else if self.peek_kw("order") {
                self.advance();
                self.expect_kw("by")?;
                clause.order_by = self.parse_order_by()?;
            } else if self.peek_kw("limit") && clause.limit.is_none() {
                self.advance();
                clause.limit = Some(self.parse_uint()?);
            } else if self.peek_kw("offset") && clause.offset.is_none() {
                self.advance();
                clause.offset = Some(self.parse_uint()?);
            } else {
                break;
            }
        }
        Ok(clause)
    }

    // ---- PUT/UPDATE/DELETE trailing clauses ----

    fn parse_trailing(
        &mut self,
    ) -> QlResult<(Option<Expr>, Option<String>, Option<ReturningClause>)> {
        let mut where_ = None;
        let mut collection = None;
        let mut returning = None;
        loop {
            if self.peek_kw("where") && where_.is_none() {
                self.advance();
                where_ = Some(self.parse_or()?);
            } else if (self.peek_kw("into") || self.peek_kw("from")) && collection.is_none() {
                self.advance();
                collection = Some(self.expect_ident()?);
            } else if self.peek_kw("returning") && returning.is_none() {
                self.advance();
                returning = Some(self.parse_returning()?);
            } else {
                break;
            }
        }
        Ok((where_, collection, returning))
    }

    fn parse_returning(&mut self) -> QlResult<ReturningClause> {
        match self.peek().clone() {
            Token::Param(name) => {
                self.advance();
                Ok(ReturningClause::Param(name))
            }
            Token::Str(s) => {
                self.advance();
                if s.eq_ignore_ascii_case("old") {
                    Ok(ReturningClause::Fixed(Returning::Old))
                } else if s.eq_ignore_ascii_case("new") {
                    Ok(ReturningClause::Fixed(Returning::New))
                } else {
                    Err(QlError::InvalidLiteral(format!("RETURNING {:?}", s)))
                }
            }
            Token::Ident(s) if s.eq_ignore_ascii_case("old") => {
                self.advance();
                Ok(ReturningClause::Fixed(Returning::Old))
            }
            Token::Ident(s) if s.eq_ignore_ascii_case("new") => {
                self.advance();
                Ok(ReturningClause::Fixed(Returning::New))
            }
            _ => Err(self.unexpected("'old', 'new', or a parameter")),
        }
    }

    fn parse_set_clause(&mut self) -> QlResult<SetClause> {
        if let Token::Param(name) = self.peek().clone() {
            self.advance();
            return Ok(SetClause::Param(name));
        }
        let mut assignments = vec![self.parse_assignment()?];
        while *self.peek() == Token::Comma {
            self.advance();
            assignments.push(self.parse_assignment()?);
        }
        Ok(SetClause::Assignments(assignments))
    }

    fn parse_assignment(&mut self) -> QlResult<Assignment> {
        let path = self.parse_path()?;
        self.expect(Token::Eq)?;
        let mutator = self.parse_mutator()?;
        Ok(Assignment { path, mutator })
    }

    fn parse_mutator(&mut self) -> QlResult<Mutator> {
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let mutator = match name.to_ascii_lowercase().as_str() {
            "put" => Mutator::Put(self.parse_operand()?),
            "insert" => Mutator::Insert(self.parse_operand()?),
            "delete" => Mutator::Delete,
            "increment" => Mutator::Increment(self.parse_operand()?),
            "move" => Mutator::Move(self.parse_path()?),
            "append" => Mutator::Append(self.parse_operand()?),
            "array_union" => Mutator::ArrayUnion(self.parse_operand()?),
            "array_remove" => Mutator::ArrayRemove(self.parse_operand()?),
            other => return Err(QlError::UnknownFunction(other.to_string())),
        };
        self.expect(Token::RParen)?;
        Ok(mutator)
    }

    // ---- data ops ----

    fn parse_data_op(&mut self, verb: &str) -> QlResult<DataOp> {
        match verb {
            "PUT" => {
                self.expect_kw("value")?;
                let value = self.parse_operand()?;
                let (where_, collection, returning) = self.parse_trailing()?;
                Ok(DataOp::Put {
                    value,
                    where_,
                    returning,
                    collection,
                })
            }
            "UPDATE" => {
                self.expect_kw("key")?;
                let key = self.parse_operand()?;
                self.expect_kw("set")?;
                let set = self.parse_set_clause()?;
                let (where_, collection, returning) = self.parse_trailing()?;
                Ok(DataOp::Update {
                    key,
                    set,
                    where_,
                    returning,
                    collection,
                })
            }
            "DELETE" => {
                self.expect_kw("key")?;
                let key = self.parse_operand()?;
                let (where_, collection, returning) = self.parse_trailing()?;
                Ok(DataOp::Delete {
                    key,
                    where_,
                    returning,
                    collection,
                })
            }
            other => Err(QlError::UnexpectedToken {
                found: other.to_string(),
                pos: self.peek_pos(),
                expected: "PUT, UPDATE, or DELETE".into(),
            }),
        }
    }

    fn parse_block(&mut self, verb: BlockVerb) -> QlResult<Block> {
        let mut ops = Vec::new();
        loop {
            if self.eat_kw("end") {
                break;
            }
            let op_verb = self.expect_ident()?.to_ascii_uppercase();
            let op = self.parse_data_op(&op_verb)?;
            self.expect(Token::Semicolon)?;
            ops.push(op);
        }
        Ok(Block { verb, ops })
    }

    // ---- top level ----

    fn parse_statement(&mut self) -> QlResult<Statement> {
        if self.at_eof() {
            return Ok(Statement::Select(QueryClause::default()));
        }
        if self.peek_kw("where") || self.peek_kw("order") || self.peek_kw("limit") || self.peek_kw("offset") {
            return Ok(Statement::Select(self.parse_query_tail(None)?));
        }
        let verb = self.expect_ident()?.to_ascii_uppercase();
        let stmt = match verb.as_str() {
            "SELECT" => {
                let select = self.parse_select_list()?;
                Statement::Select(self.parse_query_tail(Some(select))?)
            }
            "QUERY" => {
                let select = if self.peek_kw("select") {
                    self.advance();
                    Some(self.parse_select_list()?)
                } else {
                    None
                };
                Statement::Select(self.parse_query_tail(select)?)
            }
            "COUNT" => Statement::Count(self.parse_query_tail(None)?),
            "GET" => {
                self.expect_kw("key")?;
                let key = self.parse_operand()?;
                let select = if self.eat_kw("select") {
                    Some(self.parse_select_list()?)
                } else {
                    None
                };
                Statement::Get { key, select }
            }
            "PUT" | "UPDATE" | "DELETE" => Statement::Data(self.parse_data_op(&verb)?),
            "BATCH" => Statement::Block(self.parse_block(BlockVerb::Batch)?),
            "TRANSACT" => Statement::Block(self.parse_block(BlockVerb::Transact)?),
            other => {
                return Err(QlError::UnexpectedToken {
                    found: other.to_string(),
                    pos: self.peek_pos(),
                    expected: "a statement verb".into(),
                })
            }
        };
        if !self.at_eof() {
            return Err(self.unexpected("end of statement"));
        }
        Ok(stmt)
    }
}

pub fn parse_statement(input: &str) -> QlResult<Statement> {
    let tokens = lex(input)?;
    Parser::new(tokens).parse_statement()
}

pub fn parse_expr(input: &str) -> QlResult<Expr> {
    let tokens = lex(input)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_or()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

pub fn parse_select_clause(input: &str) -> QlResult<Select> {
    let tokens = lex(input)?;
    let mut parser = Parser::new(tokens);
    let select = parser.parse_select_list()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of SELECT clause"));
    }
    Ok(select)
}

pub fn parse_order_by_clause(input: &str) -> QlResult<OrderByClause> {
    let tokens = lex(input)?;
    let mut parser = Parser::new(tokens);
    let order = parser.parse_order_by()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of ORDER BY clause"));
    }
    Ok(order)
}

pub fn parse_set_clause(input: &str) -> QlResult<SetClause> {
    let tokens = lex(input)?;
    let mut parser = Parser::new(tokens);
    let set = parser.parse_set_clause()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of SET clause"));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_where() {
        let stmt = parse_statement("WHERE pk = \"pk00\" AND int > 1").unwrap();
        match stmt {
            Statement::Select(q) => assert!(q.where_.is_some()),
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn parses_select_star_with_order_and_limit() {
        let stmt = parse_statement("SELECT * WHERE bool = true ORDER BY int DESC LIMIT 3").unwrap();
        match stmt {
            Statement::Select(q) => {
                assert_eq!(q.select, Some(Select::All));
                assert_eq!(q.limit, Some(3));
                match q.order_by {
                    OrderByClause::Terms(terms) => {
                        assert_eq!(terms.len(), 1);
                        assert_eq!(terms[0].direction, SortDirection::Desc);
                    }
                    other => panic!("unexpected order by {:?}", other),
                }
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn parses_complex_predicate() {
        let stmt = parse_statement(
            "WHERE (bool = true OR obj.nobj.nnfloat <= -900.1) AND NOT is_type(obj, 'array') AND array_contains(arrint, 2)",
        )
        .unwrap();
        assert!(matches!(stmt, Statement::Select(_)));
    }

    #[test]
    fn parses_parameterized_predicate() {
        let stmt = parse_statement("WHERE int = @p1 AND str NOT IN (@p2, \"x\")").unwrap();
        match stmt {
            Statement::Select(q) => assert!(q.where_.is_some()),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_get_key() {
        let stmt = parse_statement("GET KEY {\"id\": \"5\", \"pk\": \"pk01\"}").unwrap();
        assert!(matches!(stmt, Statement::Get { .. }));
    }

    #[test]
    fn parses_put_with_returning() {
        let stmt =
            parse_statement("PUT VALUE {\"id\": \"1\"} WHERE NOT_EXISTS() RETURNING \"new\"").unwrap();
        match stmt {
            Statement::Data(DataOp::Put { where_, returning, .. }) => {
                assert!(where_.is_some());
                assert_eq!(returning, Some(ReturningClause::Fixed(Returning::New)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_update_set_with_mutators() {
        let stmt = parse_statement(
            "UPDATE KEY @key SET int = increment(1), obj.narr = append(9) WHERE exists() RETURNING \"old\"",
        )
        .unwrap();
        match stmt {
            Statement::Data(DataOp::Update { set, .. }) => match set {
                SetClause::Assignments(a) => assert_eq!(a.len(), 2),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_batch_block() {
        let stmt = parse_statement(
            "BATCH PUT VALUE {\"id\": \"1\"} INTO test; DELETE KEY {\"id\": \"2\"} FROM test; END",
        )
        .unwrap();
        match stmt {
            Statement::Block(b) => {
                assert_eq!(b.verb, BlockVerb::Batch);
                assert_eq!(b.ops.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_transact_block() {
        let stmt = parse_statement("TRANSACT UPDATE KEY @k SET str = put(\"y\") WHERE exists(); END").unwrap();
        match stmt {
            Statement::Block(b) => {
                assert_eq!(b.verb, BlockVerb::Transact);
                assert_eq!(b.ops.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
