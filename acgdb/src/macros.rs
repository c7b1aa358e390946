/// Implements `Record` for one of the catalog types.
///
/// Not intended to be used outside of `records`, where the sealing trait lives.
///
/// ## Example
/// ```
/// record! {
///     Category in Category => category,
///     patchable: ["name"],
///     uniqueness: Query::from(Condition::new("name", Operator::EqualsInsensitive)),
/// }
/// ```
macro_rules! record {
    (
        $ty:ident in $kind:ident => $field:ident,
        patchable: [$($patch:literal),* $(,)?],
        uniqueness: $unique:expr,
        $(references: |$entry:ident| $refs:expr,)?
    ) => {
        impl sealed::Sealed for $ty {}

        impl Record for $ty {
            const KIND: TableKind = TableKind::$kind;
            const PATCHABLE: &'static [&'static str] = &[$($patch),*];

            fn id(&self) -> Id {
                self.id
            }

            fn set_id(&mut self, id: Id) {
                self.id = id;
            }

            fn uniqueness() -> Query {
                $unique
            }

            $(
                fn references(&self) -> Vec<Reference> {
                    let $entry = self;
                    $refs
                }
            )?

            fn slot(tables: &Tables) -> &TableLock<Self> {
                &tables.$field
            }

            fn held(held: &Held) -> Option<&Guard<Self>> {
                held.$field.as_ref()
            }

            fn held_mut(held: &mut Held) -> Option<&mut Guard<Self>> {
                held.$field.as_mut()
            }
        }
    };
}

/// Builds a single-condition [`Query`](crate::query::Query) from a comparison.
///
/// ## Examples
/// ```
/// let recent = query!(year > 2000);
/// let named = query!(name == "Cowboy Bebop");
/// let spring = query!(year > 1999) & query!(year < 2010);
/// ```
#[macro_export]
macro_rules! query {
    ($($field:ident).+ > $value:expr) => {
        $crate::query::Query::from($crate::query::Condition::with_rhs(
            stringify!($($field).+),
            $crate::query::Operator::Greater,
            $value,
        ))
    };

    ($($field:ident).+ < $value:expr) => {
        $crate::query::Query::from($crate::query::Condition::with_rhs(
            stringify!($($field).+),
            $crate::query::Operator::Lesser,
            $value,
        ))
    };

    ($($field:ident).+ == $value:expr) => {
        $crate::query::Query::from($crate::query::Condition::with_rhs(
            stringify!($($field).+),
            $crate::query::Operator::Equals,
            $value,
        ))
    };
}
