use sqlx::{Any, Encode, QueryBuilder, Type};

/// Appends `WHERE a=? AND b IN (?, ?)` style predicates to a query builder.
///
/// Column names are compile-time strings; every value goes through
/// `push_bind`, so caller input never lands in the statement text.
pub(crate) struct Filter<'q, 'args> {
    qb: &'q mut QueryBuilder<'args, Any>,
    started: bool,
}

impl<'q, 'args> Filter<'q, 'args> {
    pub(crate) fn new(qb: &'q mut QueryBuilder<'args, Any>) -> Self {
        Self { qb, started: false }
    }

    fn glue(&mut self) -> &mut QueryBuilder<'args, Any> {
        self.qb.push(if self.started { " AND " } else { " WHERE " });
        self.started = true;
        &mut *self.qb
    }

    pub(crate) fn eq<T>(&mut self, column: &'static str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Any> + Type<Any>,
    {
        self.glue().push(column).push("=").push_bind(value);
        self
    }

    pub(crate) fn eq_opt<T>(&mut self, column: &'static str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Any> + Type<Any>,
    {
        if let Some(value) = value {
            self.eq(column, value);
        }
        self
    }

    /// An empty list matches nothing.
    pub(crate) fn is_in<T, I>(&mut self, column: &'static str, values: I) -> &mut Self
    where
        T: 'args + Encode<'args, Any> + Type<Any>,
        I: IntoIterator<Item = T>,
    {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            self.glue().push("1=0");
            return self;
        }

        let qb = self.glue();
        qb.push(column).push(" IN (");
        let mut list = qb.separated(", ");
        for value in values {
            list.push_bind(value);
        }
        list.push_unseparated(")");
        self
    }

    pub(crate) fn raw(&mut self, predicate: &'static str) -> &mut Self {
        self.glue().push(predicate);
        self
    }

    pub(crate) fn active(&mut self) -> &mut Self {
        self.raw("deleted=0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_become_placeholders() {
        let mut qb = QueryBuilder::<Any>::new("SELECT user_id FROM device");
        Filter::new(&mut qb)
            .eq("user_id", "u1'; DROP TABLE device; --".to_owned())
            .eq_opt::<i64>("platform", None)
            .eq_opt("platform", Some(1_i64))
            .active();

        assert_eq!(
            qb.sql(),
            "SELECT user_id FROM device WHERE user_id=? AND platform=? AND deleted=0"
        );
    }

    #[test]
    fn in_lists_expand_per_value() {
        let mut qb = QueryBuilder::<Any>::new("DELETE FROM room_user");
        Filter::new(&mut qb)
            .eq("room_id", "r1".to_owned())
            .is_in("user_id", vec!["u1".to_owned(), "u2".to_owned(), "u3".to_owned()]);

        assert_eq!(
            qb.sql(),
            "DELETE FROM room_user WHERE room_id=? AND user_id IN (?, ?, ?)"
        );
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let mut qb = QueryBuilder::<Any>::new("SELECT 1 FROM room_user");
        Filter::new(&mut qb).is_in("user_id", Vec::<String>::new()).active();
        assert_eq!(qb.sql(), "SELECT 1 FROM room_user WHERE 1=0 AND deleted=0");
    }
}
