use core::fmt::Write;
use core::mem;
use std::collections::HashMap;
use std::rc::Rc;

use crate::domains::{AbstractValue, Store};
use crate::elements::TypeHierarchy;
use crate::receiver::{FieldAccess, LocalVariable, PureMethodCall, Receiver, can_alias};

/// Everything a [`ReceiverStore`] needs to know on the side: the lattice
/// context of the values and the type hierarchy deciding aliasing.
pub struct StoreContext<C> {
    pub values: C,
    pub types: Rc<dyn TypeHierarchy>,
}

impl<C> StoreContext<C> {
    pub fn new(values: C, types: Rc<dyn TypeHierarchy>) -> Self {
        Self { values, types }
    }
}

/// Maps receivers to the abstract values known to hold for them. A
/// receiver without an entry has the top value.
///
/// When `sequential_semantics` is false, the analyzed program may run
/// concurrently with other code, so only facts about fields that cannot be
/// changed by other code are kept, and results of method calls are never
/// remembered.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverStore<V> {
    local_variable_values: HashMap<LocalVariable, V>,
    field_values: HashMap<FieldAccess, V>,
    method_values: HashMap<PureMethodCall, V>,
    sequential_semantics: bool,
}

impl<V: AbstractValue> ReceiverStore<V> {
    pub fn new(sequential_semantics: bool) -> Self {
        Self {
            local_variable_values: HashMap::new(),
            field_values: HashMap::new(),
            method_values: HashMap::new(),
            sequential_semantics,
        }
    }

    pub fn sequential_semantics(&self) -> bool {
        self.sequential_semantics
    }

    pub fn local_variable_values(&self) -> &HashMap<LocalVariable, V> {
        &self.local_variable_values
    }

    pub fn field_values(&self) -> &HashMap<FieldAccess, V> {
        &self.field_values
    }

    pub fn method_values(&self) -> &HashMap<PureMethodCall, V> {
        &self.method_values
    }

    pub fn is_empty(&self) -> bool {
        self.local_variable_values.is_empty()
            && self.field_values.is_empty()
            && self.method_values.is_empty()
    }

    pub fn initialize_method_parameter(&mut self, parameter: LocalVariable, value: Option<V>) {
        if let Some(value) = value {
            self.local_variable_values.insert(parameter, value);
        }
    }

    /// Whether facts about the receiver can be kept in a store at all.
    pub fn can_insert_receiver(receiver: &Receiver) -> bool {
        matches!(
            receiver,
            Receiver::LocalVariable(_) | Receiver::FieldAccess(_) | Receiver::PureMethodCall(_)
        ) && !receiver.contains_unknown()
    }

    /// Add a fact about a receiver. If the store already knows something
    /// about it, the more specific of the two values is kept.
    ///
    /// Receivers containing an unknown sub-receiver are ignored, as are
    /// receivers that cannot be tracked.
    pub fn insert_value(&mut self, receiver: &Receiver, value: V, ctx: &StoreContext<V::Context>) {
        if receiver.contains_unknown() {
            return;
        }
        let merge = |old: Option<&V>| match old {
            Some(old) => value.most_specific(old, &ctx.values),
            None => value.clone(),
        };
        match receiver {
            Receiver::LocalVariable(var) => {
                let new = merge(self.local_variable_values.get(var));
                self.local_variable_values.insert(var.clone(), new);
            }
            Receiver::FieldAccess(fa) => {
                if self.sequential_semantics || fa.is_unmodifiable_by_other_code() {
                    let new = merge(self.field_values.get(fa));
                    self.field_values.insert(fa.clone(), new);
                }
            }
            Receiver::PureMethodCall(call) => {
                if self.sequential_semantics {
                    let new = merge(self.method_values.get(call));
                    self.method_values.insert(call.clone(), new);
                }
            }
            Receiver::ThisReference(_)
            | Receiver::ClassName(_)
            | Receiver::ValueLiteral(_)
            | Receiver::Unknown(_) => {}
        }
    }

    /// Overwrite whatever the store knows about the receiver.
    pub fn replace_value(
        &mut self,
        receiver: &Receiver,
        value: Option<V>,
        ctx: &StoreContext<V::Context>,
    ) {
        self.clear_value(receiver);
        if let Some(value) = value {
            self.insert_value(receiver, value, ctx);
        }
    }

    pub fn clear_value(&mut self, receiver: &Receiver) {
        match receiver {
            Receiver::LocalVariable(var) => {
                self.local_variable_values.remove(var);
            }
            Receiver::FieldAccess(fa) => {
                self.field_values.remove(fa);
            }
            Receiver::PureMethodCall(call) => {
                self.method_values.remove(call);
            }
            _ => {}
        }
    }

    pub fn get_value(&self, receiver: &Receiver) -> Option<&V> {
        match receiver {
            Receiver::LocalVariable(var) => self.local_variable_values.get(var),
            Receiver::FieldAccess(fa) => self.field_values.get(fa),
            Receiver::PureMethodCall(call) => self.method_values.get(call),
            _ => None,
        }
    }

    /// Account for the effects of a method call.
    ///
    /// Calls that may have side effects invalidate every field fact, except
    /// for fields other code cannot modify and for fields whose monotonic
    /// qualifiers are already established. `monotonic` returns the part of
    /// a field's value that survives the call, if any. Such calls also
    /// invalidate every remembered method result. Finally the value of the
    /// call itself is recorded for `call`.
    pub fn update_for_method_call<M>(
        &mut self,
        call: &Receiver,
        side_effect_free: bool,
        value: Option<V>,
        ctx: &StoreContext<V::Context>,
        monotonic: M,
    ) where
        M: Fn(&FieldAccess, &V) -> Option<V>,
    {
        if !side_effect_free {
            let old_fields = mem::take(&mut self.field_values);
            for (fa, val) in old_fields {
                if fa.is_unmodifiable_by_other_code() {
                    self.field_values.insert(fa, val);
                } else if let Some(kept) = monotonic(&fa, &val) {
                    self.field_values.insert(fa, kept);
                }
            }
            self.method_values.clear();
        }
        self.replace_value(call, value, ctx);
    }

    /// Record the assignment `var = value`.
    pub fn update_for_local_assignment(
        &mut self,
        var: &LocalVariable,
        value: Option<V>,
        ctx: &StoreContext<V::Context>,
    ) {
        self.remove_conflicting_local(var);
        let receiver = Receiver::LocalVariable(var.clone());
        self.replace_value(&receiver, value, ctx);
    }

    /// Record the assignment `fa = value`. Facts about fields that might be
    /// the same memory location are weakened or dropped.
    pub fn update_for_field_assignment(
        &mut self,
        fa: &FieldAccess,
        value: Option<V>,
        ctx: &StoreContext<V::Context>,
    ) {
        self.remove_conflicting_field(fa, value.as_ref(), ctx);
        let receiver = Receiver::FieldAccess(fa.clone());
        if let Some(value) = value {
            if !receiver.contains_unknown()
                && (self.sequential_semantics || fa.is_unmodifiable_by_other_code())
            {
                self.field_values.insert(fa.clone(), value);
            }
        }
    }

    /// Record a write to a location the analysis cannot describe, like an
    /// array element.
    pub fn update_for_unknown_assignment(&mut self, target: &Receiver, types: &dyn TypeHierarchy) {
        self.field_values
            .retain(|fa, _| !fa.receiver().contains_alias_of(types, target));
        self.method_values.clear();
    }

    fn remove_conflicting_field(
        &mut self,
        fa: &FieldAccess,
        value: Option<&V>,
        ctx: &StoreContext<V::Context>,
    ) {
        let types = ctx.types.as_ref();
        let written = Receiver::FieldAccess(fa.clone());
        let old_fields = mem::take(&mut self.field_values);
        for (other, other_value) in old_fields {
            if other == *fa || other.receiver().contains_alias_of(types, &written) {
                continue;
            }
            if other.field() == fa.field()
                && can_alias(types, fa.receiver(), other.receiver())
                && !other.is_final()
            {
                if let Some(value) = value {
                    let joined = value.least_upper_bound(&other_value, &ctx.values);
                    self.field_values.insert(other, joined);
                }
                continue;
            }
            self.field_values.insert(other, other_value);
        }
        self.method_values.clear();
    }

    fn remove_conflicting_local(&mut self, var: &LocalVariable) {
        let receiver = Receiver::LocalVariable(var.clone());
        self.field_values
            .retain(|fa, _| !fa.receiver().contains_syntactic_equal_receiver(&receiver));
        self.method_values.retain(|call, _| {
            !call.receiver().contains_syntactic_equal_receiver(&receiver)
                && !call.contains_syntactic_equal_parameter(var)
        });
    }
}

fn join_maps<K, V>(a: &HashMap<K, V>, b: &HashMap<K, V>, ctx: &V::Context) -> HashMap<K, V>
where
    K: Clone + Eq + core::hash::Hash,
    V: AbstractValue,
{
    a.iter()
        .filter_map(|(key, left)| {
            b.get(key)
                .map(|right| (key.clone(), left.least_upper_bound(right, ctx)))
        })
        .collect()
}

impl<V: AbstractValue> Store for ReceiverStore<V> {
    type Context = StoreContext<V::Context>;

    fn least_upper_bound(&self, other: &Self, ctx: &Self::Context) -> Self {
        Self {
            local_variable_values: join_maps(
                &self.local_variable_values,
                &other.local_variable_values,
                &ctx.values,
            ),
            field_values: join_maps(&self.field_values, &other.field_values, &ctx.values),
            method_values: join_maps(&self.method_values, &other.method_values, &ctx.values),
            sequential_semantics: self.sequential_semantics,
        }
    }

    fn can_alias(&self, a: &Receiver, b: &Receiver, ctx: &Self::Context) -> bool {
        can_alias(ctx.types.as_ref(), a, b)
    }

    fn to_dot(&self) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();
        let entries = self
            .local_variable_values
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .chain(self.field_values.iter().map(|(k, v)| (k.to_string(), v)))
            .chain(self.method_values.iter().map(|(k, v)| (k.to_string(), v)));
        for (key, value) in entries {
            let mut line = String::new();
            write!(line, "{key} > {value:?}").unwrap();
            lines.push(line.replace('"', "\\\""));
        }
        lines.sort();
        Some(lines.join("\\n"))
    }
}
