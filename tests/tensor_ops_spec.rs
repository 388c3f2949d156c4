//! Seed scenarios 1, 2, 4 (§8).

use tensorforge::Tensor;

mod tensor_ops_spec {
    use super::*;

    #[test]
    fn seed_scenario_1_elementwise_vector_ops() {
        let a = Tensor::<f64>::from_data(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::<f64>::from_data(vec![3], vec![4.0, 5.0, 6.0]).unwrap();

        assert_eq!(a.add(&b).unwrap().iter().collect::<Vec<_>>(), vec![5.0, 7.0, 9.0]);
        assert_eq!(a.mul(&b).unwrap().iter().collect::<Vec<_>>(), vec![4.0, 10.0, 18.0]);

        let ratio = b.div(&a).unwrap().iter().collect::<Vec<_>>();
        for (got, want) in ratio.iter().zip([4.0, 2.5, 2.0]) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn seed_scenario_2_two_by_two_matmul() {
        let a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::from_data(vec![2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn seed_scenario_4_row_broadcast() {
        let a = Tensor::<f32>::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let v = Tensor::<f32>::from_data(vec![3], vec![10.0, 20.0, 30.0]).unwrap();
        let sum = a.add(&v).unwrap();
        assert_eq!(sum.shape(), &[2, 3]);
        assert_eq!(
            sum.iter().collect::<Vec<_>>(),
            vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
        );
    }

    #[test]
    fn zero_tensor_has_the_right_size_and_every_element_zero() {
        let z = Tensor::<f32>::zeros(vec![2, 3, 4]).unwrap();
        assert_eq!(z.len(), 24);
        assert!(z.iter().all(|v| v == 0.0));
    }

    #[test]
    fn contiguous_addition_matches_the_contiguous_strides_of_its_shape() {
        let a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let c = a.add(&b).unwrap();
        assert_eq!(c.strides(), &[2, 1]);
    }

    #[test]
    fn reduce_then_broadcast_identity_holds() {
        let x = Tensor::<f32>::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let summed_keepdim = x.sum(1, true).unwrap();
        assert_eq!(summed_keepdim.shape(), &[2, 1]);
        let broadcast_back = summed_keepdim.add(&x.zeros_like().unwrap()).unwrap();
        assert_eq!(broadcast_back.shape(), x.shape());
        assert_eq!(broadcast_back.iter().collect::<Vec<_>>(), vec![6.0, 6.0, 6.0, 15.0, 15.0, 15.0]);

        let summed_dropped = x.sum(1, false).unwrap();
        assert_eq!(summed_dropped.shape(), &[2]);
    }
}
