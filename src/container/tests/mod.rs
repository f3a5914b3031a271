mod container_tests;
